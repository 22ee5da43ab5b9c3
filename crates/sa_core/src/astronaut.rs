//! Astronauts: level/XP holders that live on a planet or in a vessel seat,
//! never both.

use serde::{Deserialize, Serialize};

use crate::ids::{AgencyId, AstronautId, ObjectId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Astronaut {
    pub id: AstronautId,
    pub name: String,
    #[serde(default)]
    pub suit_id: u32,
    #[serde(default)]
    pub appearance_id: u32,
    pub agency: AgencyId,
    /// Set while living on a planet; mutually exclusive with `vessel`.
    #[serde(default)]
    pub planet: Option<ObjectId>,
    /// Set while seated in a vessel; mutually exclusive with `planet`.
    #[serde(default)]
    pub vessel: Option<ObjectId>,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub exp: f64,
}

fn default_level() -> u32 {
    1
}

impl Astronaut {
    pub fn exp_to_next(&self) -> f64 {
        100.0 * f64::from(self.level.max(1))
    }

    /// Add XP, applying as many level-ups as it covers. Returns levels gained.
    pub fn gain_exp(&mut self, amount: f64) -> u32 {
        if amount <= 0.0 {
            return 0;
        }
        self.exp += amount;
        let mut leveled = 0;
        while self.exp >= self.exp_to_next() {
            self.exp -= self.exp_to_next();
            self.level += 1;
            leveled += 1;
        }
        leveled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn astro() -> Astronaut {
        Astronaut {
            id: AstronautId(1),
            name: "Astronaut 0".into(),
            suit_id: 0,
            appearance_id: 3,
            agency: AgencyId(1),
            planet: Some(ObjectId(2)),
            vessel: None,
            level: 1,
            exp: 0.0,
        }
    }

    #[test]
    fn level_up_at_100_times_level() {
        let mut a = astro();
        assert_eq!(a.gain_exp(99.0), 0);
        assert_eq!(a.level, 1);
        assert_eq!(a.gain_exp(1.0), 1);
        assert_eq!(a.level, 2);
        // Next level now needs 200 XP.
        assert_eq!(a.gain_exp(199.0), 0);
        assert_eq!(a.gain_exp(1.0), 1);
        assert_eq!(a.level, 3);
    }

    #[test]
    fn big_award_levels_multiple_times() {
        let mut a = astro();
        // 100 + 200 = 300 consumed; 50 carried into level 3.
        let gained = a.gain_exp(350.0);
        assert_eq!(gained, 2);
        assert_eq!(a.level, 3);
        assert!((a.exp - 50.0).abs() < 1e-9);
    }

    #[test]
    fn nonpositive_exp_is_ignored() {
        let mut a = astro();
        assert_eq!(a.gain_exp(0.0), 0);
        assert_eq!(a.gain_exp(-5.0), 0);
        assert_eq!(a.exp, 0.0);
    }
}
