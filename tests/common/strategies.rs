use chartbatch_core::model::{ItemCategory, ItemPayload, PatientId};
use proptest::prelude::*;

/// Strategy for generating procedure-style codes
pub fn code_strategy() -> impl Strategy<Value = String> {
    "[A-Z][0-9]{4}"
}

/// Strategy for generating valid patient ids
pub fn patient_id_strategy() -> impl Strategy<Value = PatientId> {
    (1i64..1_000_000i64).prop_map(PatientId)
}

/// Strategy for generating directly submittable categories
pub fn category_strategy() -> impl Strategy<Value = ItemCategory> {
    prop_oneof![
        Just(ItemCategory::Procedure),
        Just(ItemCategory::Diagnosis),
        Just(ItemCategory::Prescription),
    ]
}

/// Strategy for generating optional tooth or site designations
pub fn site_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Z]{2}[0-9]?")
}

/// Strategy for generating valid item payloads
pub fn payload_strategy() -> impl Strategy<Value = ItemPayload> {
    (
        patient_id_strategy(),
        category_strategy(),
        code_strategy(),
        site_strategy(),
        1u32..50u32,
    )
        .prop_map(|(patient_id, category, code, site, quantity)| {
            let mut payload = ItemPayload::new(patient_id, category, code).with_quantity(quantity);
            payload.site = site;
            payload
        })
}
