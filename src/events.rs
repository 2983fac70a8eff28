use alloy::primitives::Address;
use lottery_abi::{
    LOTTERY_ENTER_EVENT,
    WINNER_PICKED_EVENT,
};
use std::fmt;

/// Contract events the client listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    LotteryEnter,
    WinnerPicked,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::LotteryEnter, EventKind::WinnerPicked];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::LotteryEnter => LOTTERY_ENTER_EVENT,
            EventKind::WinnerPicked => WINNER_PICKED_EVENT,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractEvent {
    PlayerEntered { player: Address },
    WinnerPicked { winner: Address },
}

impl ContractEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContractEvent::PlayerEntered { .. } => EventKind::LotteryEnter,
            ContractEvent::WinnerPicked { .. } => EventKind::WinnerPicked,
        }
    }

    /// The activity log line for this delivery.
    pub fn describe(&self) -> String {
        match self {
            ContractEvent::PlayerEntered { player } => {
                format!("Event: New player entered! Address: {player}")
            }
            ContractEvent::WinnerPicked { winner } => {
                format!("Event: A winner has been picked! Congratulations to {winner}!")
            }
        }
    }
}

/// Raised for the user and kept on screen until acknowledged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserNotification {
    WinnerPicked { winner: Address },
}

impl fmt::Display for UserNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserNotification::WinnerPicked { winner } => {
                write!(f, "A new winner has been picked: {winner}")
            }
        }
    }
}
