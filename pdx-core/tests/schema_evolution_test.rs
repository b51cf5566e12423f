//! Integration tests for reading and rewriting objects across class versions.
//!
//! Two serializers sharing one type service stand in for two clients running
//! different builds of the same class.

mod common;

use std::sync::Arc;

use pdx_core::{
    Mode, PdxReader, PdxSerializable, PdxUnreadFields, PdxWriter, PreservedHandle, Result,
};

/// Version 1: `name`, `age`.
#[derive(Debug, Default)]
struct PersonV1 {
    name: Option<String>,
    age: i32,
    handle: Option<PreservedHandle>,
}

impl PdxSerializable for PersonV1 {
    fn class_name(&self) -> &str {
        "com.example.Person"
    }

    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
        writer.write_string("name", self.name.as_deref())?;
        writer.write_int("age", self.age)
    }

    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
        self.name = reader.read_string("name")?;
        self.age = reader.read_int("age")?;
        Ok(())
    }

    fn preserved_handle(&self) -> Option<PreservedHandle> {
        self.handle
    }

    fn set_preserved_handle(&mut self, handle: PreservedHandle) {
        self.handle = Some(handle);
    }
}

/// Version 2 adds `email` and `score`.
#[derive(Debug, Default, PartialEq)]
struct PersonV2 {
    name: Option<String>,
    age: i32,
    email: Option<String>,
    score: f64,
}

impl PdxSerializable for PersonV2 {
    fn class_name(&self) -> &str {
        "com.example.Person"
    }

    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
        writer.write_string("name", self.name.as_deref())?;
        writer.write_int("age", self.age)?;
        writer.write_string("email", self.email.as_deref())?;
        writer.write_double("score", self.score)
    }

    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
        self.name = reader.read_string("name")?;
        self.age = reader.read_int("age")?;
        self.email = reader.read_string("email")?;
        self.score = reader.read_double("score")?;
        Ok(())
    }
}

/// Version 1 again, keeping unread fields itself instead of via a handle.
#[derive(Debug, Default)]
struct PersonV1Explicit {
    name: Option<String>,
    age: i32,
    unread: Option<PdxUnreadFields>,
    last_mode: Option<Mode>,
}

impl PdxSerializable for PersonV1Explicit {
    fn class_name(&self) -> &str {
        "com.example.Person"
    }

    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
        if let Some(unread) = &self.unread {
            writer.write_unread_fields(unread)?;
        }
        writer.write_string("name", self.name.as_deref())?;
        writer.write_int("age", self.age)
    }

    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
        self.last_mode = Some(reader.mode());
        self.name = reader.read_string("name")?;
        self.age = reader.read_int("age")?;
        self.unread = reader.read_unread_fields()?;
        Ok(())
    }
}

fn alice() -> PersonV2 {
    PersonV2 {
        name: Some("alice".to_string()),
        age: 31,
        email: Some("alice@example.com".to_string()),
        score: 4.5,
    }
}

#[test]
fn test_old_client_reads_new_object() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    let bytes = new_client.serialize(&alice()).unwrap();
    let old: PersonV1 = old_client.deserialize_as(&bytes).unwrap();
    assert_eq!(old.name.as_deref(), Some("alice"));
    assert_eq!(old.age, 31);
    assert!(old.handle.is_some());
}

#[test]
fn test_rewrite_keeps_newer_fields_byte_for_byte() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    let bytes = new_client.serialize(&alice()).unwrap();
    let old: PersonV1 = old_client.deserialize_as(&bytes).unwrap();
    let preserved = old_client.get_preserved_data(old.handle.unwrap()).unwrap();
    assert_eq!(preserved.fields().len(), 2);

    let rewritten = old_client.serialize(&old).unwrap();
    assert_eq!(rewritten, bytes);
    let back: PersonV2 = new_client.deserialize_as(&rewritten).unwrap();
    assert_eq!(back, alice());
}

#[test]
fn test_modified_known_fields_merge_with_preserved_fields() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    let bytes = new_client.serialize(&alice()).unwrap();
    let mut old: PersonV1 = old_client.deserialize_as(&bytes).unwrap();
    old.age = 32;
    let rewritten = old_client.serialize(&old).unwrap();

    let back: PersonV2 = new_client.deserialize_as(&rewritten).unwrap();
    assert_eq!(back.age, 32);
    assert_eq!(back.email.as_deref(), Some("alice@example.com"));
    assert_eq!(back.score, 4.5);
}

#[test]
fn test_new_client_reads_old_object_with_defaults() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    let bytes = old_client
        .serialize(&PersonV1 {
            name: Some("bob".to_string()),
            age: 40,
            handle: None,
        })
        .unwrap();
    new_client.serialize(&alice()).unwrap();

    let back: PersonV2 = new_client.deserialize_as(&bytes).unwrap();
    assert_eq!(back.name.as_deref(), Some("bob"));
    assert_eq!(back.age, 40);
    assert_eq!(back.email, None);
    assert_eq!(back.score, 0.0);
    assert!(new_client.registry().preserved().is_empty());
}

#[test]
fn test_explicit_unread_fields_round_trip() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    // The old client learns its own schema first, so the read merges.
    old_client
        .serialize(&PersonV1Explicit {
            name: Some("seed".to_string()),
            ..Default::default()
        })
        .unwrap();

    let bytes = new_client.serialize(&alice()).unwrap();
    let old: PersonV1Explicit = old_client.deserialize_as(&bytes).unwrap();
    assert_eq!(old.last_mode, Some(Mode::MergingRemote));
    let unread = old.unread.as_ref().unwrap();
    assert_eq!(unread.len(), 2);
    assert!(old_client.registry().preserved().is_empty());

    let rewritten = old_client.serialize(&old).unwrap();
    assert_eq!(rewritten, bytes);
}

#[test]
fn test_merged_type_is_shared_between_versions() {
    let service = common::shared_service();
    let new_client = common::client(&service);
    let old_client = common::client(&service);

    let first = new_client.serialize(&alice()).unwrap();
    let second = new_client
        .serialize(&PersonV2 {
            name: Some("carol".to_string()),
            ..Default::default()
        })
        .unwrap();
    let a: PersonV1 = old_client.deserialize_as(&first).unwrap();
    let b: PersonV1 = old_client.deserialize_as(&second).unwrap();
    let da = old_client.get_preserved_data(a.handle.unwrap()).unwrap();
    let db = old_client.get_preserved_data(b.handle.unwrap()).unwrap();
    assert_eq!(da.merged_type_id(), db.merged_type_id());
    assert!(!Arc::ptr_eq(&da, &db));
}
