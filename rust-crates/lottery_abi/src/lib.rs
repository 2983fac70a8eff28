use alloy::sol;
use serde_json::Value;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface ILottery {
        event LotteryEnter(address player);
        event WinnerPicked(address winner);

        function getLotteryState() external view returns (uint8);
        function getEntryFee() external view returns (uint256);
        function getNumberOfPlayers() external view returns (uint256);
        function getRecentWinner() external view returns (address);
        function enterLottery() external payable;
    }
}

pub const LOTTERY_ENTER_EVENT: &str = "LotteryEnter";
pub const WINNER_PICKED_EVENT: &str = "WinnerPicked";

/// Functions and events the client calls or listens to.
pub const REQUIRED_ENTRIES: [&str; 7] = [
    "getLotteryState",
    "getEntryFee",
    "getNumberOfPlayers",
    "getRecentWinner",
    "enterLottery",
    LOTTERY_ENTER_EVENT,
    WINNER_PICKED_EVENT,
];

/// Names from [`REQUIRED_ENTRIES`] that a JSON ABI does not declare.
///
/// Anything that is not an array of ABI items declares nothing.
pub fn missing_entries(abi: &Value) -> Vec<&'static str> {
    let declared: Vec<&str> = abi
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    matches!(
                        item.get("type").and_then(Value::as_str),
                        Some("function") | Some("event")
                    )
                })
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    REQUIRED_ENTRIES
        .into_iter()
        .filter(|required| !declared.contains(required))
        .collect()
}
