//! Extended-attributes codec
//!
//! Extended attributes are a JSON sidecar encrypted alongside each node.
//! The top-level object uses the keys `Common`, `Media`, `Camera` and
//! `Location`; only `Common` is interpreted here, the rest is preserved
//! verbatim for forward compatibility.
//!
//! Parsing is total: invalid JSON or invalid fields produce an empty (or
//! partially filled) result with a warning, never an error. Callers must be
//! able to open a folder whose attributes another client mangled.

use crate::constants::block_sizes_sort_cutoff;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Attributes written for a folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFolderExtendedAttributes {
    /// Modification time claimed by the writing client.
    pub claimed_modification_time: Option<DateTime<Utc>>,
}

/// Attributes written for a file revision.
///
/// All fields are client-claimed and unverified; hence the naming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFileExtendedAttributes {
    /// Modification time claimed by the writing client.
    pub claimed_modification_time: Option<DateTime<Utc>>,
    /// Plaintext size in bytes claimed by the writing client.
    pub claimed_size: Option<u64>,
    /// Plaintext block sizes; for nodes created before 2025-01-01 these are
    /// re-sorted descending on read to compensate for a historical writer
    /// bug.
    pub claimed_block_sizes: Option<Vec<u64>>,
    /// Content digests claimed by the writing client.
    pub claimed_digests: Option<ClaimedDigests>,
    /// Unrecognized top-level keys (`Media`, `Camera`, ...) preserved
    /// verbatim.
    pub claimed_additional_metadata: Option<Map<String, Value>>,
}

/// Claimed content digests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedDigests {
    /// Lowercase hex SHA-1 of the plaintext.
    pub sha1: Option<String>,
}

/// Input to [`generate_file_extended_attributes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtendedAttributes {
    /// Modification time to record.
    pub modification_time: Option<DateTime<Utc>>,
    /// Plaintext size in bytes.
    pub size: Option<u64>,
    /// Plaintext block sizes in upload order.
    pub block_sizes: Option<Vec<u64>>,
    /// Content digests.
    pub digests: Option<ClaimedDigests>,
}

#[derive(Serialize)]
struct CommonOut {
    #[serde(rename = "ModificationTime", skip_serializing_if = "Option::is_none")]
    modification_time: Option<String>,
    #[serde(rename = "Size", skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(rename = "BlockSizes", skip_serializing_if = "Option::is_none")]
    block_sizes: Option<Vec<u64>>,
    #[serde(rename = "Digests", skip_serializing_if = "Option::is_none")]
    digests: Option<DigestsOut>,
}

#[derive(Serialize)]
struct DigestsOut {
    #[serde(rename = "SHA1")]
    sha1: String,
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Produce the attributes JSON for a folder, or `None` when there is nothing
/// to record.
pub fn generate_folder_extended_attributes(
    modification_time: Option<DateTime<Utc>>,
) -> Option<String> {
    let time = modification_time?;
    let common = CommonOut {
        modification_time: Some(format_time(&time)),
        size: None,
        block_sizes: None,
        digests: None,
    };
    serialize_common(common)
}

/// Produce the attributes JSON for a file revision, emitting only non-empty
/// fields, or `None` when no attributes remain.
pub fn generate_file_extended_attributes(
    attributes: &FileExtendedAttributes,
) -> Option<String> {
    let digests = attributes
        .digests
        .as_ref()
        .and_then(|d| d.sha1.clone())
        .map(|sha1| DigestsOut { sha1 });
    let block_sizes = attributes
        .block_sizes
        .clone()
        .filter(|sizes| !sizes.is_empty());
    let common = CommonOut {
        modification_time: attributes.modification_time.as_ref().map(format_time),
        size: attributes.size,
        block_sizes,
        digests,
    };
    if common.modification_time.is_none()
        && common.size.is_none()
        && common.block_sizes.is_none()
        && common.digests.is_none()
    {
        return None;
    }
    serialize_common(common)
}

fn serialize_common(common: CommonOut) -> Option<String> {
    #[derive(Serialize)]
    struct Out {
        #[serde(rename = "Common")]
        common: CommonOut,
    }
    match serde_json::to_string(&Out { common }) {
        Ok(json) => Some(json),
        Err(error) => {
            warn!(%error, "failed to serialize extended attributes");
            None
        }
    }
}

/// Parse folder attributes. Total: failures warn and yield empty fields.
pub fn parse_folder_extended_attributes(raw: Option<&str>) -> ParsedFolderExtendedAttributes {
    let Some(mut root) = parse_root(raw) else {
        return ParsedFolderExtendedAttributes::default();
    };
    let common = take_object(&mut root, "Common");
    ParsedFolderExtendedAttributes {
        claimed_modification_time: common
            .as_ref()
            .and_then(|c| parse_time_field(c, "ModificationTime")),
    }
}

/// Parse file attributes. Total: failures warn and yield empty fields.
///
/// `creation_time` selects the legacy block-size behavior: attributes of
/// nodes created before 2025-01-01 carry block sizes in an unreliable order
/// and are re-sorted descending; newer ones are passed through as stored.
pub fn parse_file_extended_attributes(
    creation_time: DateTime<Utc>,
    raw: Option<&str>,
) -> ParsedFileExtendedAttributes {
    let Some(mut root) = parse_root(raw) else {
        return ParsedFileExtendedAttributes::default();
    };
    let common = take_object(&mut root, "Common");

    let mut claimed_block_sizes = common.as_ref().and_then(|c| parse_block_sizes(c));
    if creation_time < block_sizes_sort_cutoff() {
        if let Some(sizes) = claimed_block_sizes.as_mut() {
            sizes.sort_unstable_by(|a, b| b.cmp(a));
        }
    }

    ParsedFileExtendedAttributes {
        claimed_modification_time: common
            .as_ref()
            .and_then(|c| parse_time_field(c, "ModificationTime")),
        claimed_size: common.as_ref().and_then(|c| parse_size(c)),
        claimed_block_sizes,
        claimed_digests: common.as_ref().and_then(|c| parse_digests(c)),
        claimed_additional_metadata: if root.is_empty() { None } else { Some(root) },
    }
}

fn parse_root(raw: Option<&str>) -> Option<Map<String, Value>> {
    let raw = raw?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("extended attributes are not a JSON object");
            None
        }
        Err(error) => {
            warn!(%error, "extended attributes are not valid JSON");
            None
        }
    }
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    match root.remove(key) {
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            warn!(key, "extended attribute section is not an object");
            None
        }
        None => None,
    }
}

fn parse_time_field(common: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let value = common.get(key)?;
    let Some(text) = value.as_str() else {
        warn!(key, "extended attribute time is not a string");
        return None;
    };
    match DateTime::parse_from_rfc3339(text) {
        Ok(time) => Some(time.with_timezone(&Utc)),
        Err(error) => {
            warn!(key, %error, "extended attribute time is not a valid date");
            None
        }
    }
}

fn parse_size(common: &Map<String, Value>) -> Option<u64> {
    let value = common.get("Size")?;
    match value.as_u64() {
        Some(size) => Some(size),
        None => {
            warn!("extended attribute size is not a non-negative integer");
            None
        }
    }
}

fn parse_block_sizes(common: &Map<String, Value>) -> Option<Vec<u64>> {
    let value = common.get("BlockSizes")?;
    let Some(items) = value.as_array() else {
        warn!("extended attribute block sizes are not an array");
        return None;
    };
    let mut sizes = Vec::with_capacity(items.len());
    for item in items {
        match item.as_u64() {
            Some(size) => sizes.push(size),
            None => {
                warn!("extended attribute block size is not a non-negative integer");
                return None;
            }
        }
    }
    Some(sizes)
}

fn parse_digests(common: &Map<String, Value>) -> Option<ClaimedDigests> {
    let value = common.get("Digests")?;
    let Some(map) = value.as_object() else {
        warn!("extended attribute digests are not an object");
        return None;
    };
    let sha1 = match map.get("SHA1") {
        None => None,
        Some(Value::String(hexdigest)) => Some(hexdigest.clone()),
        Some(_) => {
            warn!("extended attribute SHA1 digest is not a string");
            None
        }
    };
    Some(ClaimedDigests { sha1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).single().unwrap()
    }

    #[test]
    fn generates_folder_modification_time() {
        let json = generate_folder_extended_attributes(Some(at(1_234_567_890_000))).unwrap();
        assert_eq!(
            json,
            r#"{"Common":{"ModificationTime":"2009-02-13T23:31:30.000Z"}}"#
        );
    }

    #[test]
    fn generates_nothing_for_empty_folder_attributes() {
        assert_eq!(generate_folder_extended_attributes(None), None);
    }

    #[test]
    fn generates_file_size_zero() {
        let json = generate_file_extended_attributes(&FileExtendedAttributes {
            size: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, r#"{"Common":{"Size":0}}"#);
    }

    #[test]
    fn generates_block_sizes_and_digests() {
        let json = generate_file_extended_attributes(&FileExtendedAttributes {
            block_sizes: Some(vec![4, 4, 4, 2]),
            digests: Some(ClaimedDigests {
                sha1: Some("abcdef".to_owned()),
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"Common":{"BlockSizes":[4,4,4,2],"Digests":{"SHA1":"abcdef"}}}"#
        );
    }

    #[test]
    fn generates_nothing_when_all_fields_empty() {
        assert_eq!(
            generate_file_extended_attributes(&FileExtendedAttributes::default()),
            None
        );
        assert_eq!(
            generate_file_extended_attributes(&FileExtendedAttributes {
                block_sizes: Some(vec![]),
                digests: Some(ClaimedDigests { sha1: None }),
                ..Default::default()
            }),
            None
        );
    }

    #[test]
    fn folder_round_trip() {
        let time = at(1_700_000_000_000);
        let json = generate_folder_extended_attributes(Some(time)).unwrap();
        let parsed = parse_folder_extended_attributes(Some(&json));
        assert_eq!(parsed.claimed_modification_time, Some(time));
    }

    #[test]
    fn legacy_block_sizes_are_sorted_descending() {
        let raw = r#"{"Common":{"BlockSizes":[123,1024,1024,1024,1024]}}"#;
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let parsed = parse_file_extended_attributes(old, Some(raw));
        assert_eq!(
            parsed.claimed_block_sizes,
            Some(vec![1024, 1024, 1024, 1024, 123])
        );
    }

    #[test]
    fn modern_block_sizes_keep_stored_order() {
        let raw = r#"{"Common":{"BlockSizes":[123,1024,1024,1024,1024]}}"#;
        let new = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        let parsed = parse_file_extended_attributes(new, Some(raw));
        assert_eq!(
            parsed.claimed_block_sizes,
            Some(vec![123, 1024, 1024, 1024, 1024])
        );
    }

    #[test]
    fn unknown_sections_are_preserved() {
        let raw = r#"{"Common":{"Size":7},"Media":{"Width":100},"Camera":{"Device":"x"}}"#;
        let parsed = parse_file_extended_attributes(Utc::now(), Some(raw));
        assert_eq!(parsed.claimed_size, Some(7));
        let extra = parsed.claimed_additional_metadata.unwrap();
        assert!(extra.contains_key("Media"));
        assert!(extra.contains_key("Camera"));
        assert!(!extra.contains_key("Common"));
    }

    #[test]
    fn parsing_never_fails() {
        for raw in [
            "",
            "not json",
            "[]",
            "42",
            r#"{"Common":17}"#,
            r#"{"Common":{"ModificationTime":42}}"#,
            r#"{"Common":{"ModificationTime":"not a date"}}"#,
            r#"{"Common":{"Size":-1}}"#,
            r#"{"Common":{"Size":1.5}}"#,
            r#"{"Common":{"BlockSizes":"nope"}}"#,
            r#"{"Common":{"BlockSizes":[1,"two"]}}"#,
            r#"{"Common":{"Digests":"nope"}}"#,
            r#"{"Common":{"Digests":{"SHA1":42}}}"#,
        ] {
            let parsed = parse_file_extended_attributes(Utc::now(), Some(raw));
            assert_eq!(parsed.claimed_modification_time, None, "input: {raw}");
            let _ = parse_folder_extended_attributes(Some(raw));
        }
        assert_eq!(
            parse_file_extended_attributes(Utc::now(), None),
            ParsedFileExtendedAttributes::default()
        );
    }

    #[test]
    fn invalid_field_does_not_discard_others() {
        let raw = r#"{"Common":{"ModificationTime":"garbage","Size":9}}"#;
        let parsed = parse_file_extended_attributes(Utc::now(), Some(raw));
        assert_eq!(parsed.claimed_modification_time, None);
        assert_eq!(parsed.claimed_size, Some(9));
    }

    mod round_trip {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn generated_file_attributes_parse_back(
                size in proptest::option::of(0u64..u64::MAX / 2),
                block_sizes in proptest::option::of(
                    proptest::collection::vec(1u64..1 << 32, 1..8)
                ),
                sha1 in proptest::option::of("[0-9a-f]{40}"),
                millis in proptest::option::of(0i64..4_102_444_800_000),
            ) {
                let input = FileExtendedAttributes {
                    modification_time: millis.map(at),
                    size,
                    block_sizes: block_sizes.clone(),
                    digests: sha1.clone().map(|sha1| ClaimedDigests { sha1: Some(sha1) }),
                };
                match generate_file_extended_attributes(&input) {
                    None => {
                        prop_assert!(size.is_none());
                        prop_assert!(block_sizes.is_none());
                        prop_assert!(sha1.is_none());
                        prop_assert!(millis.is_none());
                    }
                    Some(json) => {
                        // A creation time past the cutoff keeps the stored
                        // block-size order.
                        let creation = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
                            .single()
                            .unwrap();
                        let parsed = parse_file_extended_attributes(creation, Some(&json));
                        prop_assert_eq!(parsed.claimed_size, size);
                        prop_assert_eq!(parsed.claimed_block_sizes, block_sizes);
                        prop_assert_eq!(
                            parsed.claimed_digests.and_then(|d| d.sha1),
                            sha1
                        );
                        prop_assert_eq!(
                            parsed.claimed_modification_time,
                            millis.map(at)
                        );
                        prop_assert_eq!(parsed.claimed_additional_metadata, None);
                    }
                }
            }

            #[test]
            fn parser_is_total(raw in ".*") {
                let _ = parse_file_extended_attributes(Utc::now(), Some(&raw));
                let _ = parse_folder_extended_attributes(Some(&raw));
            }
        }
    }
}
