//! Volume/gain mapping.
//!
//! Linear volume in [0, 1] maps onto attenuation in dB over [-96, 0].
//! Gain is capped at unity: boosting above 0 dB produced audible
//! artifacts in earlier revisions, so the map never exceeds it.

/// Attenuation floor; volume 0 lands here and renders as hard silence.
pub const SILENCE_DB: f32 = -96.0;

/// Unity gain; volume 1 lands here.
pub const UNITY_DB: f32 = 0.0;

/// Restrict a gain value to the supported range. Idempotent.
#[inline]
pub fn clamp_db(db: f32) -> f32 {
    db.clamp(SILENCE_DB, UNITY_DB)
}

/// Map linear volume [0, 1] to gain in dB [-96, 0].
#[inline]
pub fn db_from_volume(volume: f32) -> f32 {
    let v = volume.clamp(0.0, 1.0);
    clamp_db(v * 96.0 - 96.0)
}

/// Inverse of [`db_from_volume`]. Out-of-range gain is clamped first.
#[inline]
pub fn volume_from_db(db: f32) -> f32 {
    (clamp_db(db) + 96.0) / 96.0
}

/// Convert gain in dB to a linear amplitude multiplier.
///
/// The -96 dB floor is treated as true silence rather than the ~1.6e-5
/// it would otherwise evaluate to, so a muted track contributes nothing
/// to the mix.
#[inline]
pub fn amplitude_from_db(db: f32) -> f32 {
    let db = clamp_db(db);
    if db <= SILENCE_DB {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}
