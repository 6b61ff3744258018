mod support;

use std::{collections::BTreeMap, sync::Arc};

use diggo_lib::{
    error::{DraftError, WizardError},
    local_store::{LocalStore, DRAFT_KEY},
    wizard::{DraftSnapshot, DraftStore, FieldKey, Provenance},
};
use proptest::prelude::*;

use support::session;

/// Any subset of the form fields, each with arbitrary text.
fn draft_fields() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::vec(prop::option::of(".{0,40}"), FieldKey::ALL.len()).prop_map(|values| {
        FieldKey::ALL
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key.as_str().to_string(), value)))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_draft_survives_reopen(fields in draft_fields()) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let snapshot = DraftSnapshot::new(fields);

        DraftStore::new(Arc::new(LocalStore::open(path.clone()).unwrap()))
            .save(&snapshot)
            .unwrap();

        let reopened = DraftStore::new(Arc::new(LocalStore::open(path).unwrap()));
        prop_assert_eq!(reopened.load().unwrap(), Some(snapshot));
    }
}

#[tokio::test]
async fn test_saved_draft_restores_into_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let (first, _network, _requests) = session(&[]);
    first.wizard.edit_field(FieldKey::Name, "陳大文").await;
    first.wizard.edit_field(FieldKey::Doctor, "李醫生").await;
    let saved = first.wizard.save_draft().await.unwrap();
    DraftStore::new(Arc::new(LocalStore::open(path.clone()).unwrap()))
        .save(&saved)
        .unwrap();

    let restored_store = Arc::new(LocalStore::open(path).unwrap());
    let (second, _network, _requests) = session(&[]);
    let drafts = DraftStore::new(restored_store);
    let loaded = drafts.load().unwrap().unwrap();
    assert_eq!(loaded.fields.get("doctor").map(String::as_str), Some("李醫生"));

    for (name, value) in &loaded.fields {
        second
            .wizard
            .populate_field(FieldKey::parse(name).unwrap(), value.clone())
            .await;
    }
    let state = second.wizard.snapshot().await;
    assert_eq!(state.field_values(), saved.fields);
    assert_eq!(
        state.field(FieldKey::Name).unwrap().provenance,
        Provenance::UserEdited
    );
}

#[tokio::test]
async fn test_load_draft_through_controller() {
    let (context, _network, _requests) = session(&[]);
    let values = BTreeMap::from([
        ("name".to_string(), "Chan Tai Man".to_string()),
        ("phone".to_string(), "61234567".to_string()),
        ("unknownField".to_string(), "ignored".to_string()),
    ]);
    DraftStore::new(Arc::clone(&context.store))
        .save(&DraftSnapshot::new(values))
        .unwrap();

    let loaded = context.wizard.load_draft().await.unwrap().unwrap();
    assert_eq!(loaded.fields.len(), 3);

    let state = context.wizard.snapshot().await;
    assert_eq!(state.field(FieldKey::Name).unwrap().value, "Chan Tai Man");
    assert_eq!(state.field_values().len(), 2);
}

#[tokio::test]
async fn test_corrupt_draft_leaves_form_untouched() {
    let (context, _network, _requests) = session(&[]);
    context.wizard.edit_field(FieldKey::Name, "陳大文").await;
    context.store.set(DRAFT_KEY, "not json").unwrap();

    let before = context.wizard.snapshot().await;
    let err = context.wizard.load_draft().await.unwrap_err();
    assert!(matches!(err, WizardError::Draft(DraftError::Corrupt(_))));
    assert_eq!(context.wizard.snapshot().await, before);
}
