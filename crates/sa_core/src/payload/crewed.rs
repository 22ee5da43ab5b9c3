//! Crewed payloads (lander and shuttle): astronaut training, level-based
//! income, moon-trip XP awards, and the build-on-land mission hook.

use crate::agency::Building;
use crate::chunk::BodySnap;
use crate::ids::{ComponentTypeId, ObjectId};
use crate::outbox::Audience;
use crate::payload::{pay_out, PayloadBehavior};
use crate::vessel::{Vessel, VesselCtx};
use crate::wire;

const MOON_TRIP_XP: f64 = 200.0;
const INCOME_PER_LEVEL_PER_S: f64 = 10.0;

/// Shared strategy for the lander and the shuttle; they differ only in the
/// payload id and catalog attributes.
#[derive(Debug)]
pub struct Crewed {
    payload: ComponentTypeId,
}

impl Crewed {
    pub fn new(payload: ComponentTypeId) -> Self {
        Self { payload }
    }

    fn award_trip_xp(vessel: &Vessel, ctx: &mut VesselCtx) {
        if let Some(agency) = ctx.dir.agencies.get_mut(&vessel.agency) {
            for astro in &vessel.astronauts_onboard {
                if let Some(a) = agency.astronauts.get_mut(astro) {
                    a.gain_exp(MOON_TRIP_XP);
                }
            }
        }
    }

    /// Auto-place a declared building when landing on its planet, once per
    /// vessel. The component attribute names the planet and building type.
    fn maybe_build_on_land(vessel: &mut Vessel, ctx: &mut VesselCtx, body: &BodySnap) {
        if vessel.build_on_land_fired {
            return;
        }
        let target = vessel.components.iter().find_map(|comp| {
            ctx.catalog
                .attrs(comp.kind)
                .build_on_land
                .as_ref()
                .cloned()
        });
        let Some((planet_name, building_type)) = target else {
            return;
        };
        if !planet_name.eq_ignore_ascii_case(&body.name) {
            return;
        }

        let Some(agency) = ctx.dir.agencies.get_mut(&vessel.agency) else {
            return;
        };
        let already = agency
            .bases
            .get(&body.id)
            .is_some_and(|bs| bs.iter().any(|b| b.kind == building_type));
        if already {
            vessel.build_on_land_fired = true;
            return;
        }

        let mut building = Building::new(building_type, body.id, vessel.landed_angle_offset);
        building.constructed = true;
        agency.add_building(building);
        agency.unlocked_buildings.insert(building_type);
        agency.update_attributes(ctx.catalog, ctx.tuning);

        let building_name = ctx
            .catalog
            .building(building_type)
            .map_or_else(|| format!("Building {building_type}"), |d| d.name.clone());
        ctx.outbox.datagram(
            Audience::Agency(vessel.agency),
            wire::notification(
                wire::NOTIFY_SUCCESS,
                &format!(
                    "{} established {building_name} on {}",
                    agency.name, body.name
                ),
            ),
        );
        vessel.build_on_land_fired = true;
    }
}

impl PayloadBehavior for Crewed {
    fn payload_id(&self) -> ComponentTypeId {
        self.payload
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 {
            return;
        }
        let real_dt = ctx.tuning.real_seconds(dt);
        let xp_rate = ctx.catalog.attrs(vessel.payload).training_xp_rate;

        let mut total_levels = 0u32;
        if let Some(agency) = ctx.dir.agencies.get_mut(&vessel.agency) {
            for astro in &vessel.astronauts_onboard {
                if let Some(a) = agency.astronauts.get_mut(astro) {
                    a.gain_exp(xp_rate * real_dt);
                    total_levels += a.level.max(1);
                }
            }
        }

        if total_levels > 0 {
            pay_out(
                vessel,
                ctx,
                INCOME_PER_LEVEL_PER_S * f64::from(total_levels) * real_dt,
            );
        }
    }

    fn on_land(
        &mut self,
        vessel: &mut Vessel,
        ctx: &mut VesselCtx,
        body: &BodySnap,
        prev_body: Option<ObjectId>,
    ) {
        Self::maybe_build_on_land(vessel, ctx, body);

        // Trip-based XP: landing on a moon after last touching a different
        // body. Bounce-landing on the same moon earns nothing.
        if body.is_moon && prev_body != Some(body.id) {
            Self::award_trip_xp(vessel, ctx);
            ctx.outbox.datagram(
                Audience::Agency(vessel.agency),
                wire::notification(
                    wire::NOTIFY_SUCCESS,
                    &format!(
                        "{}: astronauts gained +200 XP for completing a trip and landing on {}!",
                        vessel.name, body.name
                    ),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::kinds;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};

    #[test]
    fn training_levels_up_astronauts_and_pays_by_level() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::crewed_lander(&catalog, &mut parts);
        let mut behavior = Crewed::new(kinds::LUNAR_LANDER);

        // Default training rate is 0.1 XP/s; 1000 seconds levels a fresh
        // astronaut from 1 to 2.
        for _ in 0..1000 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        let agency = &parts.dir.agencies[&test_fixtures::AGENCY];
        let astro = agency
            .astronauts
            .get(&vessel.astronauts_onboard[0])
            .unwrap();
        assert_eq!(astro.level, 2);
        // 10 per level-second: at least 10 × 1000 × 1 level.
        assert!(vessel.lifetime_revenue >= 10_000);
    }

    #[test]
    fn moon_trip_awards_xp_once_per_different_body() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::crewed_lander(&catalog, &mut parts);
        let moon = parts.bodies.get(test_fixtures::MOON).unwrap().clone();
        let mut behavior = Crewed::new(kinds::LUNAR_LANDER);

        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_land(&mut vessel, &mut ctx, &moon, Some(test_fixtures::EARTH));
        }
        let xp = parts.dir.agencies[&test_fixtures::AGENCY]
            .astronauts
            .get(&vessel.astronauts_onboard[0])
            .unwrap()
            .exp;
        assert!((xp - 200.0).abs() < 1e-9);

        // Bounce-landing on the same moon: nothing.
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_land(&mut vessel, &mut ctx, &moon, Some(test_fixtures::MOON));
        }
        let xp = parts.dir.agencies[&test_fixtures::AGENCY]
            .astronauts
            .get(&vessel.astronauts_onboard[0])
            .unwrap()
            .exp;
        assert!((xp - 200.0).abs() < 1e-9);
    }

    #[test]
    fn landing_on_a_planet_awards_no_trip_xp() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::crewed_lander(&catalog, &mut parts);
        let earth = parts.bodies.get(test_fixtures::EARTH).unwrap().clone();
        let mut behavior = Crewed::new(kinds::LUNAR_LANDER);
        let mut ctx = make_ctx(&catalog, &mut parts);
        behavior.on_land(&mut vessel, &mut ctx, &earth, Some(test_fixtures::MOON));
        drop(ctx);
        let xp = parts.dir.agencies[&test_fixtures::AGENCY]
            .astronauts
            .get(&vessel.astronauts_onboard[0])
            .unwrap()
            .exp;
        assert_eq!(xp, 0.0);
    }

    #[test]
    fn build_on_land_fires_once_and_unlocks_the_building() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::crewed_lander(&catalog, &mut parts);
        // The fixture lander carries a build-on-land module for the Moon.
        let moon = parts.bodies.get(test_fixtures::MOON).unwrap().clone();
        let mut behavior = Crewed::new(kinds::LUNAR_LANDER);

        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_land(&mut vessel, &mut ctx, &moon, None);
        }
        assert!(vessel.build_on_land_fired);
        let agency = &parts.dir.agencies[&test_fixtures::AGENCY];
        let placed = agency
            .bases
            .get(&test_fixtures::MOON)
            .map_or(0, |bs| bs.len());
        assert_eq!(placed, 1);
        assert!(agency
            .unlocked_buildings
            .contains(&test_fixtures::MOON_HQ_BUILDING));

        // A second landing must not duplicate the building.
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_land(&mut vessel, &mut ctx, &moon, Some(test_fixtures::MOON));
        }
        let agency = &parts.dir.agencies[&test_fixtures::AGENCY];
        assert_eq!(agency.bases.get(&test_fixtures::MOON).unwrap().len(), 1);
    }

    #[test]
    fn build_on_land_ignores_other_planets() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::crewed_lander(&catalog, &mut parts);
        let mars = parts.bodies.get(test_fixtures::MARS).unwrap().clone();
        let mut behavior = Crewed::new(kinds::LUNAR_LANDER);
        let mut ctx = make_ctx(&catalog, &mut parts);
        behavior.on_land(&mut vessel, &mut ctx, &mars, None);
        drop(ctx);
        assert!(!vessel.build_on_land_fired);
        assert!(parts.dir.agencies[&test_fixtures::AGENCY]
            .bases
            .get(&test_fixtures::MARS)
            .is_none());
    }
}
