// src/vip.rs
//! Watch-list person records as the pipeline reads them.

use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vip {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    /// Free-text keyword appended to the feed query's keyword block.
    #[serde(default)]
    pub query_extra: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl Vip {
    pub fn new(id: impl Into<String>, name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            title: None,
            org: None,
            query_extra: None,
            is_active: true,
        }
    }

    pub fn with_query_extra(mut self, extra: impl Into<String>) -> Self {
        self.query_extra = Some(extra.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Stable id derived from the display name (seeded VIPs carry no id).
    pub fn id_for_name(name: &str) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(name.trim().as_bytes());
        let mut out = String::with_capacity(16);
        out.push_str("vip-");
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

/// Seed entry from `[[vips]]` in the pipeline config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VipSeed {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub query_extra: Option<String>,
}

impl VipSeed {
    pub fn into_vip(self) -> Vip {
        Vip {
            id: Vip::id_for_name(&self.name),
            name: self.name.trim().to_string(),
            aliases: self.aliases,
            title: self.title,
            org: self.org,
            query_extra: self.query_extra,
            is_active: true,
        }
    }
}
