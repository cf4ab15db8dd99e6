//! The standard CCD reduction catalog.

use super::{Granularity, StageDef, StageFlags, StageRegistry};

/// Bad-pixel mask construction.
pub const STAGE_BADPIX: &str = "badpix";
/// Overscan subtraction and CCD trimming.
pub const STAGE_OSCAN: &str = "oscan";
/// Master 2-D bias.
pub const STAGE_BIAS2D: &str = "bias2d";
/// Master dome flat.
pub const STAGE_FLAT2D: &str = "flat2d";
/// First processing round.
pub const STAGE_PROC1: &str = "proc1";
/// Illumination correction image.
pub const STAGE_ILLUM: &str = "illum";
/// Illumination-corrected sky-flat candidates.
pub const STAGE_SKYFLAT_ILLUM: &str = "skyflat_illum";
/// Fringe master.
pub const STAGE_FRINGE: &str = "fringe";
/// Fringe-corrected, sky-subtracted sky-flat candidates.
pub const STAGE_SKYFLAT_FRINGE: &str = "skyflat_fringe";
/// Final sky flat.
pub const STAGE_SKYFLAT: &str = "skyflat";
/// Second processing round.
pub const STAGE_PROC2: &str = "proc2";
/// Astrometric solution.
pub const STAGE_WCS: &str = "wcs";
/// Source catalog.
pub const STAGE_CATALOG: &str = "catalog";

/// Every stage.
pub const GROUP_ALL: &str = "all";
/// Alias of [`GROUP_ALL`].
pub const GROUP_FULL: &str = "full";
/// Calibration masters.
pub const GROUP_CALIB: &str = "calib";
/// The sky-flat derivation sequence.
pub const GROUP_SKYFLAT_SEQ: &str = "skyflat-seq";
/// Science products downstream of the sky flat.
pub const GROUP_SCIENCE: &str = "science";

const DERIVATION: [&str; 4] = [
    STAGE_SKYFLAT_ILLUM,
    STAGE_FRINGE,
    STAGE_SKYFLAT_FRINGE,
    STAGE_SKYFLAT,
];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|&name| name.to_string()).collect()
}

impl StageRegistry {
    /// Returns the standard reduction catalog.
    ///
    /// The sky flat is derived in two scratch passes: candidates with the
    /// illumination correction applied feed the fringe master, and
    /// fringe-corrected candidates feed the final sky flat.
    #[must_use]
    pub fn standard() -> Self {
        let defs = vec![
            StageDef::new(STAGE_BADPIX, "badpix").per(Granularity::Ccd),
            StageDef::new(STAGE_OSCAN, "oscan"),
            StageDef::new(STAGE_BIAS2D, "bias")
                .after([STAGE_OSCAN])
                .reading([STAGE_OSCAN])
                .per(Granularity::Ccd),
            StageDef::new(STAGE_FLAT2D, "domeflat")
                .after([STAGE_BIAS2D])
                .reading([STAGE_OSCAN, STAGE_BIAS2D])
                .per(Granularity::Band),
            StageDef::new(STAGE_PROC1, "proc1")
                .after([STAGE_BIAS2D, STAGE_FLAT2D])
                .softly_after([STAGE_BADPIX])
                .reading([STAGE_OSCAN, STAGE_BIAS2D, STAGE_FLAT2D, STAGE_BADPIX])
                .with_flags(
                    StageFlags::new()
                        .without_illum()
                        .without_fringe()
                        .without_sky_flat(),
                ),
            StageDef::new(STAGE_ILLUM, "illum")
                .after([STAGE_PROC1])
                .reading([STAGE_PROC1, STAGE_BADPIX])
                .per(Granularity::Band),
            StageDef::new(STAGE_SKYFLAT_ILLUM, "skyflat_cand")
                .after([STAGE_ILLUM])
                .reading([STAGE_PROC1, STAGE_ILLUM])
                .with_flags(
                    StageFlags::new()
                        .scratch("illum")
                        .without_fringe()
                        .without_sky_flat(),
                ),
            StageDef::new(STAGE_FRINGE, "fringe")
                .after([STAGE_SKYFLAT_ILLUM])
                .reading([STAGE_SKYFLAT_ILLUM])
                .per(Granularity::Band),
            StageDef::new(STAGE_SKYFLAT_FRINGE, "skyflat_cand")
                .after([STAGE_FRINGE])
                .reading([STAGE_SKYFLAT_ILLUM, STAGE_FRINGE])
                .with_flags(
                    StageFlags::new()
                        .scratch("fringe")
                        .with_sky_subtraction()
                        .without_sky_flat(),
                ),
            StageDef::new(STAGE_SKYFLAT, "skyflat")
                .after([STAGE_SKYFLAT_FRINGE])
                .reading([STAGE_SKYFLAT_FRINGE])
                .per(Granularity::Band),
            StageDef::new(STAGE_PROC2, "proc2")
                .after([STAGE_SKYFLAT])
                .reading([
                    STAGE_OSCAN,
                    STAGE_BIAS2D,
                    STAGE_FLAT2D,
                    STAGE_ILLUM,
                    STAGE_FRINGE,
                    STAGE_SKYFLAT,
                    STAGE_BADPIX,
                ]),
            StageDef::new(STAGE_WCS, "wcs")
                .after([STAGE_PROC2])
                .reading([STAGE_PROC2]),
            StageDef::new(STAGE_CATALOG, "catalog")
                .after([STAGE_WCS])
                .reading([STAGE_PROC2, STAGE_WCS]),
        ];

        let every: Vec<String> = defs.iter().map(|def| def.name.clone()).collect();
        let groups = vec![
            (GROUP_ALL.to_string(), every.clone()),
            (GROUP_FULL.to_string(), every),
            (
                GROUP_CALIB.to_string(),
                owned(&[STAGE_BADPIX, STAGE_OSCAN, STAGE_BIAS2D, STAGE_FLAT2D]),
            ),
            (GROUP_SKYFLAT_SEQ.to_string(), owned(&DERIVATION)),
            (
                GROUP_SCIENCE.to_string(),
                owned(&[STAGE_PROC2, STAGE_WCS, STAGE_CATALOG]),
            ),
        ];

        Self::assemble(defs, groups, owned(&DERIVATION))
    }
}
