//! Unit tests for localized identifiers.

use rstest::rstest;

use super::*;

const SERVER_ID: &str = "6f1e2f3c-8d9a-4b5c-9e0f-1a2b3c4d5e6f";

#[rstest]
#[case(Zone::FrPar1, Region::FrPar)]
#[case(Zone::FrPar3, Region::FrPar)]
#[case(Zone::NlAms2, Region::NlAms)]
#[case(Zone::PlWaw3, Region::PlWaw)]
fn zone_maps_to_enclosing_region(#[case] zone: Zone, #[case] region: Region) {
    assert_eq!(zone.region(), region);
    assert_eq!(region_name_of(zone.as_str()), Some(region.as_str()));
}

#[test]
fn format_then_parse_round_trips_for_every_zone() {
    for zone in Zone::ALL {
        let formatted = new_zoned_id(*zone, SERVER_ID);
        let parsed = parse_zoned_id(&formatted).expect("formatted id should parse");
        assert_eq!(parsed, (*zone, SERVER_ID.to_owned()));
    }
}

#[rstest]
#[case::missing_zone(SERVER_ID)]
#[case::unknown_zone("mars-base-1/6f1e2f3c-8d9a-4b5c-9e0f-1a2b3c4d5e6f")]
#[case::not_uuid("fr-par-1/server-123")]
#[case::too_many_segments("fr-par-1/6f1e2f3c-8d9a-4b5c-9e0f-1a2b3c4d5e6f/extra")]
fn strict_parse_rejects_malformed_ids(#[case] raw: &str) {
    assert!(parse_zoned_id(raw).is_err(), "{raw} should be rejected");
}

#[test]
fn lenient_parse_returns_no_zone_for_bare_ids() {
    let (zone, id) = parse_zoned_id_lenient(SERVER_ID).expect("bare id is accepted");
    assert_eq!(zone, None);
    assert_eq!(id, SERVER_ID);
}

#[test]
fn lenient_parse_still_rejects_unknown_zone_prefix() {
    let err = parse_zoned_id_lenient("xx-yyy-9/abc").expect_err("zone must be known");
    assert_eq!(err, LocalityError::UnknownZone(String::from("xx-yyy-9")));
}

#[rstest]
#[case("fr-par-1/abc", "abc")]
#[case("abc", "abc")]
#[case("fr-par-1/outer/inner", "inner")]
fn expand_id_keeps_last_segment(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(expand_id(raw), expected);
}

#[test]
fn nested_id_round_trips_with_free_form_inner_segment() {
    let nested = NestedZonedId::new(Zone::NlAms1, SERVER_ID, "cloud-init");
    let rendered = nested.to_string();
    assert_eq!(rendered, format!("nl-ams-1/{SERVER_ID}/cloud-init"));
    assert_eq!(parse_nested_zoned_id(&rendered).expect("parse"), nested);
}

#[test]
fn nested_id_requires_three_segments() {
    let err = parse_nested_zoned_id(&format!("fr-par-1/{SERVER_ID}")).expect_err("two segments");
    assert!(matches!(err, LocalityError::Malformed { .. }));
}

#[test]
fn regional_ids_accept_bare_and_prefixed_forms() {
    assert_eq!(
        parse_regional_id_lenient(&format!("fr-par/{SERVER_ID}")).expect("regional"),
        (Some(Region::FrPar), SERVER_ID.to_owned())
    );
    assert!(validate_regional_uuid(SERVER_ID).is_ok());
    assert!(validate_regional_uuid("fr-par/not-a-uuid").is_err());
}

#[test]
fn zone_serialises_as_plain_string() {
    let json = serde_json::to_string(&Zone::PlWaw2).expect("serialise");
    assert_eq!(json, "\"pl-waw-2\"");
    let zone: Zone = serde_json::from_str("\"fr-par-2\"").expect("deserialise");
    assert_eq!(zone, Zone::FrPar2);
}

#[test]
fn region_lists_its_zones() {
    assert_eq!(
        Region::NlAms.zones(),
        vec![Zone::NlAms1, Zone::NlAms2, Zone::NlAms3]
    );
}
