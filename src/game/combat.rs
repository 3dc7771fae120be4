//! Combat system - weapons, damage, shot validation, scoring

use crate::game::RoomError;

/// Maximum player health
pub const MAX_HEALTH: f32 = 100.0;

/// Killing damage at or above this counts as the head-hit tier
pub const HEAD_HIT_DAMAGE: f32 = 40.0;

/// Score for a kill
pub const KILL_SCORE: u32 = 100;
/// Score for a head-hit-tier kill
pub const HEAD_HIT_KILL_SCORE: u32 = 150;

/// Server-side weapon configuration, indexed by the wire `weaponIdx`
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Upper bound on damage per shot; client-claimed damage is clamped here
    pub damage_cap: f32,
    /// Maximum hit-scan range in meters
    pub range: f32,
    /// Minimum interval between shots in milliseconds
    pub fire_interval_ms: u64,
    /// Shots per magazine
    pub ammo_capacity: u32,
}

impl WeaponStats {
    pub fn for_index(weapon_idx: usize) -> Self {
        match weapon_idx {
            // Rifle: the default loadout
            0 => Self {
                damage_cap: 100.0,
                range: 100.0,
                fire_interval_ms: 150,
                ammo_capacity: 30,
            },
            // Pistol: sidearm fallback
            _ => Self {
                damage_cap: 40.0,
                range: 50.0,
                fire_interval_ms: 300,
                ammo_capacity: 12,
            },
        }
    }
}

/// Stateless combat helpers
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, killed).
    /// Health is clamped so a snapshot never carries a negative value.
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Score awarded to the shooter for a kill
    pub fn kill_score(killing_damage: f32) -> u32 {
        if killing_damage >= HEAD_HIT_DAMAGE {
            HEAD_HIT_KILL_SCORE
        } else {
            KILL_SCORE
        }
    }

    /// Validate a shot server-side instead of trusting the client report.
    /// Checks fire rate, range and ammo; returns the damage to apply,
    /// clamped to the weapon's cap.
    pub fn validate_shot(
        weapon: &WeaponStats,
        claimed_damage: f32,
        distance: f32,
        ammo: u32,
        now_ms: u64,
        last_shot_ms: u64,
    ) -> Result<f32, RoomError> {
        if ammo == 0 {
            return Err(RoomError::ShotRejected("out of ammo"));
        }
        if last_shot_ms != 0 && now_ms.saturating_sub(last_shot_ms) < weapon.fire_interval_ms {
            return Err(RoomError::ShotRejected("fire rate exceeded"));
        }
        if distance > weapon.range {
            return Err(RoomError::ShotRejected("target out of range"));
        }
        Ok(claimed_damage.clamp(0.0, weapon.damage_cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_never_goes_negative() {
        let (health, killed) = CombatSystem::apply_damage(30.0, 70.0);
        assert_eq!(health, 0.0);
        assert!(killed);

        let (health, killed) = CombatSystem::apply_damage(100.0, 40.0);
        assert_eq!(health, 60.0);
        assert!(!killed);
    }

    #[test]
    fn kill_score_tiers_on_head_hit_damage() {
        assert_eq!(CombatSystem::kill_score(39.9), KILL_SCORE);
        assert_eq!(CombatSystem::kill_score(40.0), HEAD_HIT_KILL_SCORE);
        assert_eq!(CombatSystem::kill_score(70.0), HEAD_HIT_KILL_SCORE);
    }

    #[test]
    fn claimed_damage_is_clamped_to_weapon_cap() {
        let rifle = WeaponStats::for_index(0);
        let damage =
            CombatSystem::validate_shot(&rifle, 9999.0, 10.0, 30, 1_000, 0).expect("valid shot");
        assert_eq!(damage, rifle.damage_cap);
    }

    #[test]
    fn fire_rate_is_enforced() {
        let rifle = WeaponStats::for_index(0);
        // Second shot 10ms after the first
        let result = CombatSystem::validate_shot(&rifle, 10.0, 10.0, 30, 1_010, 1_000);
        assert_eq!(result, Err(RoomError::ShotRejected("fire rate exceeded")));

        // Well past the interval
        let result = CombatSystem::validate_shot(&rifle, 10.0, 10.0, 30, 1_300, 1_000);
        assert!(result.is_ok());
    }

    #[test]
    fn out_of_range_and_out_of_ammo_are_rejected() {
        let rifle = WeaponStats::for_index(0);
        assert_eq!(
            CombatSystem::validate_shot(&rifle, 10.0, 500.0, 30, 1_000, 0),
            Err(RoomError::ShotRejected("target out of range"))
        );
        assert_eq!(
            CombatSystem::validate_shot(&rifle, 10.0, 10.0, 0, 1_000, 0),
            Err(RoomError::ShotRejected("out of ammo"))
        );
    }
}
