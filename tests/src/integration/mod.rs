//! Cross-node integration flows.

pub mod flows;
