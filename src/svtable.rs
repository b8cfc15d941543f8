/*!
The fixed `{GUID -> name}` table for SV_SPECIFIC sections, recovered from
`original_source/common/include/GUIDDefs.h`. Used by the secondary-data writer
to name each SV-section blob it emits (§4.K).
*/

use crate::types::Guid;

pub const SVRAWDUMP_PARTITION_GUID: Guid = Guid::new(
    0x66C9B323,
    0xF7FC,
    0x48B6,
    [0xBF, 0x96, 0x6F, 0x32, 0xE3, 0x35, 0xA4, 0x28],
);

pub const AP_REG_GUID: Guid = Guid::new(
    0xAB3A051F,
    0xEF0B,
    0x4A5F,
    [0xA7, 0x9A, 0x80, 0xC2, 0x43, 0xBA, 0x08, 0x48],
);

pub const OCIMEM_GUID: Guid = Guid::new(
    0xD0A267A1,
    0x9CA5,
    0x471D,
    [0x8E, 0x9C, 0x79, 0xC9, 0x86, 0xBE, 0x77, 0x77],
);

pub const CODERAM_GUID: Guid = Guid::new(
    0x100B990B,
    0x0F9B,
    0x40B3,
    [0x82, 0xEF, 0x06, 0x61, 0x4F, 0x53, 0x05, 0xFE],
);

pub const DATARAM_GUID: Guid = Guid::new(
    0x82233308,
    0xCE47,
    0x4D52,
    [0x92, 0x11, 0xF4, 0x2E, 0x89, 0x61, 0x8A, 0xF4],
);

pub const MSGRAM_GUID: Guid = Guid::new(
    0x91A8C35C,
    0xA340,
    0x4F2E,
    [0xB7, 0x27, 0x65, 0x39, 0x47, 0xDB, 0x9C, 0x76],
);

pub const LPM_GUID: Guid = Guid::new(
    0x877F61E0,
    0xA870,
    0x4635,
    [0x9F, 0x41, 0x33, 0x00, 0x53, 0x20, 0x26, 0x05],
);

pub const PMIC_PON_GUID: Guid = Guid::new(
    0x10D25EDD,
    0x1558,
    0x4B88,
    [0xAB, 0x5C, 0xE8, 0x1E, 0x7F, 0x47, 0xDA, 0xD9],
);

pub const RST_STAT_GUID: Guid = Guid::new(
    0xD0352E48,
    0xE359,
    0x459E,
    [0x9B, 0xBF, 0x2E, 0x16, 0xE6, 0x28, 0xAC, 0xFB],
);

pub const LOAD_CMM_GUID: Guid = Guid::new(
    0x066A56C8,
    0xCE2A,
    0x4686,
    [0xB6, 0x10, 0x5B, 0xFC, 0x22, 0xD0, 0xC7, 0xAB],
);

pub const RAWDUMP_BIN_GUID: Guid = Guid::new(
    0x0DF632E9,
    0x5C48,
    0x43AA,
    [0xB8, 0xBD, 0x5F, 0xF6, 0x18, 0x05, 0x02, 0x5F],
);

pub const DDR_DATA_GUID: Guid = Guid::new(
    0x62FB2678,
    0x933F,
    0x4177,
    [0x86, 0x29, 0xFF, 0x3F, 0x70, 0x55, 0x02, 0xE3],
);

pub const UNKNOWN_GUID: Guid = Guid::new(
    0x6901D825,
    0x0E25,
    0x4D6C,
    [0x8C, 0x11, 0xE0, 0xAB, 0x2E, 0x98, 0xCA, 0xEF],
);

const TABLE: &[(Guid, &str)] = &[
    (AP_REG_GUID, "AP_REG"),
    (OCIMEM_GUID, "OCIMEM.BIN"),
    (CODERAM_GUID, "CODERAM.BIN"),
    (DATARAM_GUID, "DATARAM.BIN"),
    (MSGRAM_GUID, "MSGRAM.BIN"),
    (LPM_GUID, "LPM.BIN"),
    (PMIC_PON_GUID, "PMIC_PON.BIN"),
    (RST_STAT_GUID, "RST_STAT.BIN"),
    (LOAD_CMM_GUID, "load.cmm"),
    (RAWDUMP_BIN_GUID, "rawdump.bin"),
    (DDR_DATA_GUID, "DDR_DATA.BIN"),
];

/// Looks up the human-readable name for a SV_SPECIFIC section's GUID,
/// falling back to the `UNKNOWN` sentinel name for anything not in the table.
pub fn name_for(guid: &Guid) -> &'static str {
    TABLE
        .iter()
        .find(|(g, _)| g == guid)
        .map(|(_, name)| *name)
        .unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_guid_resolves_to_its_name() {
        assert_eq!(name_for(&AP_REG_GUID), "AP_REG");
        assert_eq!(name_for(&DDR_DATA_GUID), "DDR_DATA.BIN");
    }

    #[test]
    fn unknown_guid_falls_back_to_sentinel() {
        assert_eq!(name_for(&Guid::NULL), "UNKNOWN");
    }

    #[test]
    fn partition_guid_matches_recovered_value() {
        assert_eq!(
            format!("{}", SVRAWDUMP_PARTITION_GUID),
            "66C9B323-F7FC-48B6-BF96-6F32E335A428"
        );
    }
}
