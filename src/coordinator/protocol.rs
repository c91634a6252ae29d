//! Control-plane conventions shared with storage nodes
//!
//! Layout of the coordination namespace:
//!
//! ```text
//! /metadata                  JSON ring snapshot (ordered NodeRecord list)
//! /server/<port>             one znode per active node
//! /server/<port>/metadata    JSON NodeRecord of that node
//! /server/<port>/op          pending command (see Command)
//! /awaitNodes/<port>         created by a storage process once it is up
//! ```
//!
//! Commands are `NAME` or `KV_TRANSFER|<targetPort>|<startHex>|<endHex>`.

use crate::common::{EcsConfig, Error, HashRange, Result, RingHash};
use crate::coordination::join_path;
use std::fmt;
use std::str::FromStr;

pub const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init,
    Start,
    Stop,
    ShutDown,
    /// Push every pair whose key hash falls in `range` to the node on `target_port`
    KvTransfer { target_port: u16, range: HashRange },
    /// Written by the source of a transfer once the range has been pushed
    TransferFinish,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init => "INIT",
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::ShutDown => "SHUT_DOWN",
            Command::KvTransfer { .. } => "KV_TRANSFER",
            Command::TransferFinish => "TRANSFER_FINISH",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        std::str::from_utf8(payload)
            .map_err(|_| Error::InvalidCommand("command is not UTF-8".into()))?
            .parse()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::KvTransfer { target_port, range } => write!(
                f,
                "{}{d}{}{d}{}{d}{}",
                self.name(),
                target_port,
                range.start,
                range.end,
                d = DELIMITER
            ),
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.trim().split(DELIMITER);
        let name = tokens.next().unwrap_or_default();
        let rest: Vec<&str> = tokens.collect();

        let command = match (name, rest.as_slice()) {
            ("INIT", []) => Command::Init,
            ("START", []) => Command::Start,
            ("STOP", []) => Command::Stop,
            ("SHUT_DOWN", []) => Command::ShutDown,
            ("TRANSFER_FINISH", []) => Command::TransferFinish,
            ("KV_TRANSFER", [port, start, end]) => {
                let target_port = port
                    .parse()
                    .map_err(|_| Error::InvalidCommand(format!("bad target port in {:?}", s)))?;
                let start: RingHash = start
                    .parse()
                    .map_err(|_| Error::InvalidCommand(format!("bad range start in {:?}", s)))?;
                let end: RingHash = end
                    .parse()
                    .map_err(|_| Error::InvalidCommand(format!("bad range end in {:?}", s)))?;
                Command::KvTransfer {
                    target_port,
                    range: HashRange::new(start, end),
                }
            }
            _ => return Err(Error::InvalidCommand(s.to_string())),
        };
        Ok(command)
    }
}

/// Well-known znode paths
#[derive(Debug, Clone)]
pub struct Paths {
    pub metadata_root: String,
    pub server_root: String,
    pub await_root: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self::from_config(&EcsConfig::default())
    }
}

impl Paths {
    pub fn from_config(config: &EcsConfig) -> Self {
        Self {
            metadata_root: config.metadata_root.clone(),
            server_root: config.server_root.clone(),
            await_root: config.await_root.clone(),
        }
    }

    /// Znode holding the JSON ring snapshot
    pub fn ring_snapshot(&self) -> &str {
        &self.metadata_root
    }

    pub fn server(&self, port: u16) -> String {
        join_path(&self.server_root, &port.to_string())
    }

    pub fn command(&self, port: u16) -> String {
        join_path(&self.server(port), "op")
    }

    pub fn node_metadata(&self, port: u16) -> String {
        join_path(&self.server(port), "metadata")
    }

    pub fn registration(&self, port: u16) -> String {
        join_path(&self.await_root, &port.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        for command in [
            Command::Init,
            Command::Start,
            Command::Stop,
            Command::ShutDown,
            Command::TransferFinish,
        ] {
            assert_eq!(Command::decode(&command.encode()).unwrap(), command);
        }
        assert_eq!(Command::ShutDown.to_string(), "SHUT_DOWN");
    }

    #[test]
    fn test_kv_transfer_wire_format() {
        let command = Command::KvTransfer {
            target_port: 50001,
            range: HashRange::new(RingHash(10), RingHash(90)),
        };
        let text = command.to_string();
        assert_eq!(
            text,
            format!("KV_TRANSFER|50001|{:032x}|{:032x}", 10, 90)
        );
        assert_eq!(text.parse::<Command>().unwrap(), command);
    }

    #[test]
    fn test_unknown_commands_rejected() {
        for bad in ["", "RESTART", "START|1", "KV_TRANSFER|1|2", "KV_TRANSFER|x|00|00"] {
            assert!(
                matches!(bad.parse::<Command>(), Err(Error::InvalidCommand(_))),
                "{:?} should not parse",
                bad
            );
        }
        assert!(Command::decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_paths() {
        let paths = Paths::default();
        assert_eq!(paths.ring_snapshot(), "/metadata");
        assert_eq!(paths.server(50000), "/server/50000");
        assert_eq!(paths.command(50000), "/server/50000/op");
        assert_eq!(paths.node_metadata(50000), "/server/50000/metadata");
        assert_eq!(paths.registration(50000), "/awaitNodes/50000");
    }
}
