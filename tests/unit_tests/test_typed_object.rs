// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use dctm_client_rs::codec::ValueType;
use dctm_client_rs::obj::WireMode;
use dctm_client_rs::obj::attr_value::Value;
use dctm_client_rs::obj::type_cache;
use dctm_client_rs::obj::typed_object::{ObjectReader, TypedObject, parse_type_stream};
use serial_test::serial;

const D6: WireMode = WireMode {
    ser_version: 2,
    iso8601_time: true,
};

fn parse_text(text: &str, mode: WireMode) -> TypedObject {
    TypedObject::parse(Bytes::copy_from_slice(text.as_bytes()), mode).expect("parse")
}

#[test]
#[serial]
fn legacy_text_object() {
    type_cache::clear();
    let text = "TYPE GeneratedType 0000000000000000 NULL\n\
                4\n\
                object_name STRING S 255\n\
                r_is_public BOOL S 0\n\
                keywords STRING R 0\n\
                r_creation_date TIME S 0\n\
                OBJ GeneratedType\n\
                4\n\
                A 4 Temp\n\
                T\n\
                2\n\
                A 3 one\n\
                A 3 two\n\
                2020-01-15T10:30:00Z\n\
                0\n";
    let obj = parse_text(text, WireMode::LEGACY);

    assert_eq!(obj.len(), 4);
    assert_eq!(obj.string("object_name").as_deref(), Some("Temp"));
    assert_eq!(obj.boolean("r_is_public"), Some(true));
    assert_eq!(obj.strings("keywords"), vec!["one", "two"]);
    assert_eq!(obj.time("r_creation_date"), Some(Some(1579084200)));
    assert!(obj.get("keywords").is_some_and(|a| a.repeating));
    // the inline descriptor lands in the process-wide cache
    assert!(type_cache::contains("GeneratedType"));
}

#[test]
#[serial]
fn d6_object_with_positions() {
    type_cache::clear();
    let text = "2\n\
                TYPE dm_cabinet 0300000000000001 1 0 0 NULL NULL NULL F\n\
                3\n\
                A object_name STRING S 255 0\n\
                B r_is_public BOOL S 0 0\n\
                C keywords STRING R 0 0\n\
                OBJ dm_cabinet 0 0 0\n\
                3\n\
                A S 2 A 4 Temp\n\
                B S 0 T\n\
                C R 2\n\
                2\n\
                A 3 one\n\
                A 3 two\n\
                0\n";
    let obj = parse_text(text, D6);

    assert_eq!(obj.string("object_name").as_deref(), Some("Temp"));
    assert_eq!(obj.boolean("r_is_public"), Some(true));
    assert_eq!(obj.strings("keywords"), vec!["one", "two"]);

    let cached = type_cache::get("dm_cabinet").expect("cached");
    assert_eq!(cached.count(), 3);
    assert_eq!(cached.get(0).expect("pos 0").name, "object_name");
    assert_eq!(cached.get(2).expect("pos 2").name, "keywords");
}

#[test]
#[serial]
fn d6_runtime_type_overrides_undefined_schema_slot() {
    type_cache::clear();
    // schema says UNDEFINED, the attribute block says INT (wire id 1)
    let text = "2\n\
                TYPE GeneratedType 0000000000000000 1 0 0 NULL NULL NULL F\n\
                1\n\
                A wildcard UNDEFINED S 0 0\n\
                OBJ GeneratedType 0 0 0\n\
                1\n\
                A S 1 42\n\
                0\n";
    let obj = parse_text(text, D6);
    assert_eq!(obj.int("wildcard"), Some(42));
    assert_eq!(
        obj.get("wildcard").expect("attr").attr_type,
        ValueType::Int
    );
}

#[test]
#[serial]
fn extended_attributes_keep_their_marker() {
    type_cache::clear();
    let text = "TYPE GeneratedType 0000000000000000 NULL\n\
                1\n\
                object_name STRING S 255\n\
                OBJ GeneratedType\n\
                1\n\
                A 4 Temp\n\
                1\n\
                custom_flag BOOL S 0\n\
                T\n";
    let obj = parse_text(text, WireMode::LEGACY);

    let extended = obj.get("custom_flag").expect("extended attr");
    assert!(extended.extended);
    assert_eq!(extended.values, vec![Value::Bool(true)]);
    assert!(!obj.get("object_name").expect("primary").extended);

    let dump = obj.dump();
    assert!(dump.contains("ATTRIBUTES:"));
    assert!(dump.contains("EXTENDED:"));
    assert!(dump.contains("custom_flag"));
}

#[test]
#[serial]
fn supertype_chain_flattens_on_insert() {
    type_cache::clear();
    let parent = "2\n\
                  TYPE dm_sysobject 0300000000000002 1 0 0 NULL NULL NULL F\n\
                  2\n\
                  A object_name STRING S 255 0\n\
                  B title STRING S 400 0\n";
    let child = "2\n\
                 TYPE dm_document 0300000000000003 1 0 0 dm_sysobject NULL NULL F\n\
                 1\n\
                 C authors STRING R 48 0\n";

    let mut reader = ObjectReader::new(Bytes::copy_from_slice(parent.as_bytes()), D6);
    reader.read_ser_version_header().expect("header");
    let parent_type = reader.read_type_descriptor().expect("parent");
    type_cache::add(parent_type);

    let mut reader = ObjectReader::new(Bytes::copy_from_slice(child.as_bytes()), D6);
    reader.read_ser_version_header().expect("header");
    let child_type = reader.read_type_descriptor().expect("child");
    type_cache::add(child_type);

    let flattened = type_cache::get("dm_document").expect("cached");
    // attribute count equals the sum across the chain
    assert_eq!(flattened.count(), 3);
    assert!(flattened.pending.is_none());
    // inherited attributes come first, in ancestor order
    let names: Vec<&str> = flattened.attrs().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["object_name", "title", "authors"]);
    // position map stays unique and addressable
    assert_eq!(flattened.get(0).expect("0").name, "object_name");
    assert_eq!(flattened.get(2).expect("2").name, "authors");
}

#[test]
#[serial]
fn fetch_type_stream_registers_each_descriptor() {
    type_cache::clear();
    // the stream opens with the descriptor count and a D6 filler integer
    let text = "2\n\
                0\n\
                TYPE dm_sysobject 0300000000000002 1 0 0 NULL NULL NULL F\n\
                1\n\
                A object_name STRING S 255 0\n\
                TYPE dm_folder 0300000000000004 1 0 0 dm_sysobject NULL NULL F\n\
                1\n\
                B r_folder_path STRING R 0 0\n";
    let mode = WireMode {
        ser_version: 2,
        iso8601_time: true,
    };
    let last = parse_type_stream(Bytes::copy_from_slice(text.as_bytes()), mode)
        .expect("parse")
        .expect("some");
    assert_eq!(last.name, "dm_folder");
    assert!(type_cache::contains("dm_sysobject"));
    let folder = type_cache::get("dm_folder").expect("cached");
    assert_eq!(folder.count(), 2, "folder inherits sysobject attributes");
}

#[test]
#[serial]
fn serialized_form_matches_the_wire_shape() {
    type_cache::clear();
    let mut obj = TypedObject::new(WireMode::LEGACY);
    obj.set_string("QUERY", "select 1");
    obj.set_bool("FOR_UPDATE", false);
    obj.set_int("BATCH_HINT", 50);
    obj.set_time("R_DATE", Some(1579084200));
    obj.set_time("NULL_DATE", None);

    let text = obj.serialize();
    assert!(text.starts_with("OBJ NULL 0 5\n"));
    assert!(text.contains("QUERY STRING S 0\nA 8 select 1\n"));
    assert!(text.contains("FOR_UPDATE BOOL S 0\nF\n"));
    assert!(text.contains("BATCH_HINT INT S 0\n50\n"));
    // legacy time format for ser-version 0
    assert!(text.contains("R_DATE TIME S 0\nJan 15 10:30:00 2020\n"));
    assert!(text.contains("NULL_DATE TIME S 0\nnulldate\n"));
}

#[test]
#[serial]
fn d6_serialized_form_carries_version_and_iso_times() {
    type_cache::clear();
    let mut obj = TypedObject::new(D6);
    obj.set_time("R_DATE", Some(1579084200));
    obj.set_id("OBJECT_ID", "");

    let text = obj.serialize();
    assert!(text.starts_with("2\nOBJ NULL 0 0 0\n0\n2\n"));
    assert!(text.contains("R_DATE TIME S 0\n2020-01-15T10:30:00Z\n"));
    assert!(text.contains("OBJECT_ID ID S 0\n0000000000000000\n"));
}

#[test]
#[serial]
fn serialized_objects_parse_back_attribute_for_attribute() {
    type_cache::clear();
    let mut obj = TypedObject::new(WireMode::LEGACY);
    obj.set_string("object_name", "a name with spaces");
    obj.set_id("r_object_id", "0900000080000001");
    obj.set_bool("r_is_public", true);
    obj.set_int("r_page_cnt", 3);
    obj.set_double("weight", 2.5);
    obj.set_time("r_expiry", None);
    obj.append_string("keywords", "one");
    obj.append_string("keywords", "two");

    let text = obj.serialize();
    let parsed = dctm_client_rs::obj::docbroker::parse_self_described(Bytes::from(text))
        .expect("parse back");

    assert_eq!(parsed.len(), obj.len());
    for attr in obj.attrs() {
        let back = parsed.get(&attr.name).expect("attribute survived");
        assert_eq!(back.repeating, attr.repeating, "{}", attr.name);
        assert_eq!(back.values, attr.values, "{}", attr.name);
    }
}

#[test]
#[serial]
fn hex_encoded_strings_decode() {
    type_cache::clear();
    let text = "TYPE GeneratedType 0000000000000000 NULL\n\
                1\n\
                blob STRING S 0\n\
                OBJ GeneratedType\n\
                1\n\
                H 3 616263\n\
                0\n";
    let obj = parse_text(text, WireMode::LEGACY);
    assert_eq!(obj.string("blob").as_deref(), Some("abc"));
}
