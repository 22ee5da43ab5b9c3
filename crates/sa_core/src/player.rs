//! Server-side player record. The network session that currently speaks for
//! a player lives in the daemon; the core only knows whether one is bound.

use serde::{Deserialize, Serialize};

use crate::ids::{AgencyId, ObjectId, PlayerId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub money: i64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub galaxy: u32,
    pub system: u32,
    #[serde(default)]
    pub agency: AgencyId,
    /// 0-sentinel free; `None` when not flying anything.
    #[serde(default)]
    pub controlled_vessel: Option<ObjectId>,
    /// True while a live session is bound. Not persisted.
    #[serde(skip)]
    pub connected: bool,
}

impl Player {
    pub fn new(id: PlayerId, starting_cash: i64) -> Self {
        Self {
            id,
            money: starting_cash,
            x: 0.0,
            y: 0.0,
            galaxy: 1,
            system: 1,
            agency: AgencyId(0),
            controlled_vessel: None,
            connected: false,
        }
    }

    pub fn in_agency(&self) -> bool {
        self.agency.0 != 0
    }
}
