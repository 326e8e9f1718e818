//! Function/event signatures and the Lottery ABI document

use alloy_primitives::B256;
use serde_json::{json, Value};
use tiny_keccak::{Hasher, Keccak};

/// `enterRaffle()`, payable
pub const ENTER_RAFFLE: &str = "enterRaffle()";
/// `checkUpkeep(bytes)`, returns `(bool upkeepNeeded, bytes performData)`
pub const CHECK_UPKEEP: &str = "checkUpkeep(bytes)";
/// `performUpkeep(bytes)`
pub const PERFORM_UPKEEP: &str = "performUpkeep(bytes)";
/// `getEntranceFee()`
pub const GET_ENTRANCE_FEE: &str = "getEntranceFee()";
/// `getInterval()`
pub const GET_INTERVAL: &str = "getInterval()";
/// `getLotteryState()`
pub const GET_LOTTERY_STATE: &str = "getLotteryState()";
/// `getPlayer(uint256)`
pub const GET_PLAYER: &str = "getPlayer(uint256)";
/// `getRecentWinner()`
pub const GET_RECENT_WINNER: &str = "getRecentWinner()";
/// `getNumberOfPlayers()`
pub const GET_NUMBER_OF_PLAYERS: &str = "getNumberOfPlayers()";
/// `getLatestTimeStamp()`
pub const GET_LATEST_TIMESTAMP: &str = "getLatestTimeStamp()";
/// VRF coordinator mock entry point used on development chains
pub const FULFILL_RANDOM_WORDS: &str = "fulfillRandomWords(uint256,address)";

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// 4-byte function (or custom error) selector of a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic 0 of a canonical event signature
pub fn event_topic(signature: &str) -> B256 {
    B256::from(keccak256(signature.as_bytes()))
}

fn param(kind: &str, name: &str) -> Value {
    json!({ "type": kind, "name": name })
}

fn event_param(kind: &str, name: &str, indexed: bool) -> Value {
    json!({ "type": kind, "name": name, "indexed": indexed })
}

fn function(name: &str, mutability: &str, inputs: Vec<Value>, outputs: Vec<Value>) -> Value {
    json!({
        "type": "function",
        "name": name,
        "constant": matches!(mutability, "view" | "pure"),
        "payable": mutability == "payable",
        "stateMutability": mutability,
        "inputs": inputs,
        "outputs": outputs,
    })
}

fn error(name: &str, inputs: Vec<Value>) -> Value {
    json!({ "type": "error", "name": name, "inputs": inputs })
}

fn event(name: &str, inputs: Vec<Value>) -> Value {
    json!({ "type": "event", "anonymous": false, "name": name, "inputs": inputs })
}

/// Interface description of the deployed Lottery contract, in the JSON
/// interchange format front ends consume (`abi.json`).
pub fn lottery_abi() -> Value {
    Value::Array(vec![
        json!({
            "type": "constructor",
            "payable": false,
            "stateMutability": "nonpayable",
            "inputs": [
                param("address", "vrfCoordinatorV2"),
                param("uint256", "entranceFee"),
                param("bytes32", "gasLane"),
                param("uint64", "subscriptionId"),
                param("uint32", "callbackGasLimit"),
                param("uint256", "interval"),
            ],
        }),
        error("Lottery__NotEnoughETHEntered", vec![]),
        error("Lottery__NotOpen", vec![]),
        error("Lottery__TransferFailed", vec![]),
        error(
            "Lottery__UpKeepNotNeeded",
            vec![
                param("uint256", "currentBalance"),
                param("uint256", "numPlayers"),
                param("uint256", "lotteryState"),
            ],
        ),
        error(
            "OnlyCoordinatorCanFulfill",
            vec![param("address", "have"), param("address", "want")],
        ),
        event("RaffleEnter", vec![event_param("address", "player", true)]),
        event(
            "RequestedLotteryWinner",
            vec![event_param("uint256", "requestId", true)],
        ),
        event("WinnerPicked", vec![event_param("address", "winner", true)]),
        function(
            "checkUpkeep",
            "view",
            vec![param("bytes", "")],
            vec![param("bool", "upkeepNeeded"), param("bytes", "")],
        ),
        function("enterRaffle", "payable", vec![], vec![]),
        function("getEntranceFee", "view", vec![], vec![param("uint256", "")]),
        function("getInterval", "view", vec![], vec![param("uint256", "")]),
        function("getLatestTimeStamp", "view", vec![], vec![param("uint256", "")]),
        function("getLotteryState", "view", vec![], vec![param("uint8", "")]),
        function("getNumberOfPlayers", "view", vec![], vec![param("uint256", "")]),
        function(
            "getPlayer",
            "view",
            vec![param("uint256", "index")],
            vec![param("address", "")],
        ),
        function("getRecentWinner", "view", vec![], vec![param("address", "")]),
        function("performUpkeep", "nonpayable", vec![param("bytes", "")], vec![]),
        function(
            "rawFulfillRandomWords",
            "nonpayable",
            vec![param("uint256", "requestId"), param("uint256[]", "randomWords")],
            vec![],
        ),
    ])
}

/// Canonical signature (`name(type,..)`) of a JSON ABI entry
pub fn canonical_signature(entry: &Value) -> Option<String> {
    let name = entry.get("name")?.as_str()?;
    let inputs = entry
        .get("inputs")?
        .as_array()?
        .iter()
        .map(|input| input.get("type").and_then(Value::as_str))
        .collect::<Option<Vec<_>>>()?;
    Some(format!("{}({})", name, inputs.join(",")))
}

/// Solidity types of the constructor inputs in a JSON ABI
pub fn constructor_types(abi: &Value) -> Vec<String> {
    abi.as_array()
        .into_iter()
        .flatten()
        .find(|entry| entry.get("type").and_then(Value::as_str) == Some("constructor"))
        .and_then(|ctor| ctor.get("inputs"))
        .and_then(Value::as_array)
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(|input| input.get("type").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
