//! Brazilian federative units (UF) and their IBGE codes.
//!
//! Used to check the state code embedded in access keys and the `UF`
//! field of addresses.

/// Check whether `code` is a known IBGE state code.
pub fn is_known_state_code(code: u8) -> bool {
    STATES.binary_search_by_key(&code, |(c, _)| *c).is_ok()
}

/// Two-letter abbreviation for an IBGE state code.
pub fn state_abbreviation(code: u8) -> Option<&'static str> {
    STATES
        .binary_search_by_key(&code, |(c, _)| *c)
        .ok()
        .map(|i| STATES[i].1)
}

/// IBGE code for a two-letter abbreviation (e.g. "SP" → 35).
pub fn state_code(abbreviation: &str) -> Option<u8> {
    STATES
        .iter()
        .find(|(_, uf)| *uf == abbreviation)
        .map(|(c, _)| *c)
}

/// Check whether `abbreviation` names a state. `EX` (abroad) is accepted
/// for foreign recipients.
pub fn is_known_state(abbreviation: &str) -> bool {
    abbreviation == "EX" || state_code(abbreviation).is_some()
}

/// The 27 federative units, sorted by IBGE code for binary search.
static STATES: &[(u8, &str)] = &[
    (11, "RO"),
    (12, "AC"),
    (13, "AM"),
    (14, "RR"),
    (15, "PA"),
    (16, "AP"),
    (17, "TO"),
    (21, "MA"),
    (22, "PI"),
    (23, "CE"),
    (24, "RN"),
    (25, "PB"),
    (26, "PE"),
    (27, "AL"),
    (28, "SE"),
    (29, "BA"),
    (31, "MG"),
    (32, "ES"),
    (33, "RJ"),
    (35, "SP"),
    (41, "PR"),
    (42, "SC"),
    (43, "RS"),
    (50, "MS"),
    (51, "MT"),
    (52, "GO"),
    (53, "DF"),
];
