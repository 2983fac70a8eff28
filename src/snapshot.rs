use crate::error::ClientError;
use alloy::primitives::{
    Address,
    U256,
    utils::format_ether,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LotteryPhase {
    Open,
    CalculatingWinner,
    Closed,
}

impl TryFrom<u8> for LotteryPhase {
    type Error = ClientError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LotteryPhase::Open),
            1 => Ok(LotteryPhase::CalculatingWinner),
            2 => Ok(LotteryPhase::Closed),
            other => Err(ClientError::UnknownLotteryPhase(other)),
        }
    }
}

impl fmt::Display for LotteryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LotteryPhase::Open => "OPEN",
            LotteryPhase::CalculatingWinner => "CALCULATING_WINNER",
            LotteryPhase::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// The contract reports "no winner" as the zero address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecentWinner {
    None,
    Winner(Address),
}

impl From<Address> for RecentWinner {
    fn from(address: Address) -> Self {
        if address == Address::ZERO {
            RecentWinner::None
        } else {
            RecentWinner::Winner(address)
        }
    }
}

impl fmt::Display for RecentWinner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecentWinner::None => f.write_str("No winner yet"),
            RecentWinner::Winner(address) => write!(f, "{address}"),
        }
    }
}

/// Lottery state as read in one refresh. Never mutated after it is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotterySnapshot {
    pub phase: LotteryPhase,
    pub prize_pool_wei: U256,
    pub entry_fee_wei: U256,
    pub player_count: U256,
    pub recent_winner: RecentWinner,
}

impl LotterySnapshot {
    pub fn prize_pool_ether(&self) -> String {
        format_ether(self.prize_pool_wei)
    }

    pub fn entry_fee_ether(&self) -> String {
        format_ether(self.entry_fee_wei)
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn try_from__known_codes__map_to_named_phases() {
        assert_eq!(LotteryPhase::try_from(0), Ok(LotteryPhase::Open));
        assert_eq!(
            LotteryPhase::try_from(1),
            Ok(LotteryPhase::CalculatingWinner)
        );
        assert_eq!(LotteryPhase::try_from(2), Ok(LotteryPhase::Closed));
    }

    #[test]
    fn try_from__out_of_range_code__is_rejected() {
        for code in [3u8, 4, 200, u8::MAX] {
            assert_eq!(
                LotteryPhase::try_from(code),
                Err(ClientError::UnknownLotteryPhase(code))
            );
        }
    }

    #[test]
    fn recent_winner__zero_address__renders_no_winner_yet() {
        let winner = RecentWinner::from(Address::ZERO);

        assert_eq!(winner, RecentWinner::None);
        assert_eq!(winner.to_string(), "No winner yet");
    }

    #[test]
    fn recent_winner__real_address__renders_the_address() {
        let raw = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");

        let winner = RecentWinner::from(raw);

        assert_eq!(winner, RecentWinner::Winner(raw));
        assert_eq!(winner.to_string(), raw.to_string());
    }

    #[test]
    fn ether_amounts__are_formatted_from_wei() {
        let snapshot = LotterySnapshot {
            phase: LotteryPhase::Open,
            prize_pool_wei: U256::from(5_000_000_000_000_000_000u128),
            entry_fee_wei: U256::from(100_000_000_000_000_000u128),
            player_count: U256::from(3),
            recent_winner: RecentWinner::None,
        };

        assert!(snapshot.prize_pool_ether().starts_with("5.0"));
        assert!(snapshot.entry_fee_ether().starts_with("0.1"));
    }
}
