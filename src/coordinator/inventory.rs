//! Server inventory file
//!
//! ```text
//! # name      host        port
//! server_1    10.0.0.11   50000
//! server_2    10.0.0.12   50000
//! ```

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
}

pub fn parse_inventory(text: &str) -> Result<Vec<ServerEntry>> {
    let mut entries = Vec::new();
    let mut names = HashSet::new();
    let mut addresses = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, host, port] = fields.as_slice() else {
            return Err(Error::InvalidConfig(format!(
                "inventory line {}: expected `name host port`, got {:?}",
                line_no, line
            )));
        };
        let port: u16 = port.parse().map_err(|_| {
            Error::InvalidConfig(format!("inventory line {}: bad port {:?}", line_no, port))
        })?;

        if !names.insert(name.to_string()) {
            return Err(Error::InvalidConfig(format!(
                "inventory line {}: server {} listed twice",
                line_no, name
            )));
        }
        if !addresses.insert((host.to_string(), port)) {
            return Err(Error::InvalidConfig(format!(
                "inventory line {}: address {}:{} listed twice",
                line_no, host, port
            )));
        }

        entries.push(ServerEntry {
            name: name.to_string(),
            host: host.to_string(),
            port,
        });
    }

    Ok(entries)
}

pub async fn load_inventory(path: &Path) -> Result<Vec<ServerEntry>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::InvalidConfig(format!("cannot read inventory {}: {}", path.display(), e))
    })?;
    let entries = parse_inventory(&text)?;
    tracing::info!("Loaded {} servers from {}", entries.len(), path.display());
    Ok(entries)
}
