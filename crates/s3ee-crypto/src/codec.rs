//! Envelope serialization
//!
//! The same four fields are persisted in either representation:
//!
//! | field           | value                                    |
//! |-----------------|------------------------------------------|
//! | `x-amz-key-v2`  | wrapped content key, standard base64     |
//! | `x-amz-iv`      | body nonce, standard base64              |
//! | `x-amz-cek-alg` | content algorithm identifier             |
//! | `x-amz-matdesc` | canonical materials description          |
//!
//! Embedded form: four user-metadata entries on the ciphertext object.
//! Instruction form: one JSON object with those four members, stored as the body
//! of the sibling instruction object.
//!
//! These names are a persisted contract; do not rename them.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use s3ee_core::{S3eeError, S3eeResult};
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, MaterialsDescription};
use crate::{CONTENT_ALGORITHM, NONCE_SIZE};

pub const WRAPPED_KEY_FIELD: &str = "x-amz-key-v2";
pub const NONCE_FIELD: &str = "x-amz-iv";
pub const ALGORITHM_FIELD: &str = "x-amz-cek-alg";
pub const DESCRIPTION_FIELD: &str = "x-amz-matdesc";

/// Metadata entry marking an object as an instruction object.
pub const INSTRUCTION_MARKER: &str = "x-amz-crypto-instr-file";

pub const ENVELOPE_FIELDS: [&str; 4] = [
    WRAPPED_KEY_FIELD,
    NONCE_FIELD,
    ALGORITHM_FIELD,
    DESCRIPTION_FIELD,
];

#[derive(Debug, Serialize, Deserialize)]
struct InstructionDocument {
    #[serde(rename = "x-amz-key-v2")]
    wrapped_key: String,
    #[serde(rename = "x-amz-iv")]
    nonce: String,
    #[serde(rename = "x-amz-cek-alg")]
    algorithm: String,
    #[serde(rename = "x-amz-matdesc")]
    description: String,
}

/// Converts envelopes to and from their persisted forms.
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Encode as user-metadata entries for the ciphertext object.
    pub fn to_metadata(envelope: &Envelope) -> HashMap<String, String> {
        HashMap::from([
            (WRAPPED_KEY_FIELD.to_string(), STANDARD.encode(&envelope.wrapped_key)),
            (NONCE_FIELD.to_string(), STANDARD.encode(envelope.nonce)),
            (ALGORITHM_FIELD.to_string(), envelope.algorithm.clone()),
            (
                DESCRIPTION_FIELD.to_string(),
                envelope.description.to_canonical_string(),
            ),
        ])
    }

    /// Decode from the ciphertext object's user metadata.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> S3eeResult<Envelope> {
        if ENVELOPE_FIELDS.iter().all(|f| !metadata.contains_key(*f)) {
            return Err(S3eeError::malformed(
                "object metadata carries no envelope (was it written with an instruction object?)",
            ));
        }

        let field = |name: &str| {
            metadata
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| S3eeError::malformed(format!("metadata entry {name} is missing")))
        };

        decode_fields(
            field(WRAPPED_KEY_FIELD)?,
            field(NONCE_FIELD)?,
            field(ALGORITHM_FIELD)?,
            field(DESCRIPTION_FIELD)?,
        )
    }

    /// Encode as the JSON body of an instruction object.
    pub fn to_instruction(envelope: &Envelope) -> S3eeResult<Vec<u8>> {
        let doc = InstructionDocument {
            wrapped_key: STANDARD.encode(&envelope.wrapped_key),
            nonce: STANDARD.encode(envelope.nonce),
            algorithm: envelope.algorithm.clone(),
            description: envelope.description.to_canonical_string(),
        };
        serde_json::to_vec(&doc)
            .map_err(|e| S3eeError::Other(anyhow::anyhow!("instruction serialization: {e}")))
    }

    /// Decode an instruction object body.
    pub fn from_instruction(data: &[u8]) -> S3eeResult<Envelope> {
        let doc: InstructionDocument = serde_json::from_slice(data)
            .map_err(|e| S3eeError::malformed(format!("instruction document: {e}")))?;
        decode_fields(&doc.wrapped_key, &doc.nonce, &doc.algorithm, &doc.description)
    }

    /// Remove embedded envelope entries, leaving only caller metadata.
    pub fn strip(metadata: &mut HashMap<String, String>) {
        for field in ENVELOPE_FIELDS {
            metadata.remove(field);
        }
    }
}

fn decode_fields(
    wrapped_key_b64: &str,
    nonce_b64: &str,
    algorithm: &str,
    description: &str,
) -> S3eeResult<Envelope> {
    if algorithm != CONTENT_ALGORITHM {
        return Err(S3eeError::malformed(format!(
            "unsupported content algorithm {algorithm:?} (expected {CONTENT_ALGORITHM:?})"
        )));
    }

    let wrapped_key = STANDARD
        .decode(wrapped_key_b64)
        .map_err(|e| S3eeError::malformed(format!("{WRAPPED_KEY_FIELD}: base64 decode: {e}")))?;
    if wrapped_key.is_empty() {
        return Err(S3eeError::malformed(format!("{WRAPPED_KEY_FIELD} is empty")));
    }

    let nonce_bytes = STANDARD
        .decode(nonce_b64)
        .map_err(|e| S3eeError::malformed(format!("{NONCE_FIELD}: base64 decode: {e}")))?;
    let nonce: [u8; NONCE_SIZE] = nonce_bytes.as_slice().try_into().map_err(|_| {
        S3eeError::malformed(format!(
            "{NONCE_FIELD} has {} bytes (expected {NONCE_SIZE})",
            nonce_bytes.len()
        ))
    })?;

    Ok(Envelope {
        wrapped_key,
        nonce,
        algorithm: algorithm.to_string(),
        description: MaterialsDescription::parse(description)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> Envelope {
        Envelope {
            wrapped_key: vec![0xAB; 48],
            nonce: [0x11; NONCE_SIZE],
            algorithm: CONTENT_ALGORITHM.to_string(),
            description: MaterialsDescription::new().with("key", "k1"),
        }
    }

    fn assert_malformed(result: S3eeResult<Envelope>) {
        match result {
            Err(S3eeError::MalformedEnvelope(_)) => {}
            other => panic!("expected MalformedEnvelope, got {other:?}"),
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let envelope = sample_envelope();
        let metadata = EnvelopeCodec::to_metadata(&envelope);

        assert_eq!(metadata.len(), 4);
        assert_eq!(metadata[DESCRIPTION_FIELD], r#"{"key":"k1"}"#);
        assert_eq!(metadata[ALGORITHM_FIELD], CONTENT_ALGORITHM);
        assert_eq!(EnvelopeCodec::from_metadata(&metadata).unwrap(), envelope);
    }

    #[test]
    fn test_instruction_document_shape() {
        let bytes = EnvelopeCodec::to_instruction(&sample_envelope()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 4);
        for field in ENVELOPE_FIELDS {
            assert!(obj[field].is_string(), "{field} must be a string member");
        }
        assert_eq!(
            EnvelopeCodec::from_instruction(&bytes).unwrap(),
            sample_envelope()
        );
    }

    #[test]
    fn test_both_forms_carry_identical_values() {
        let envelope = sample_envelope();
        let metadata = EnvelopeCodec::to_metadata(&envelope);
        let doc: HashMap<String, String> =
            serde_json::from_slice(&EnvelopeCodec::to_instruction(&envelope).unwrap()).unwrap();
        assert_eq!(metadata, doc);
    }

    #[test]
    fn test_metadata_without_envelope() {
        let metadata = HashMap::from([("owner".to_string(), "alice".to_string())]);
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_metadata_missing_one_field() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.remove(NONCE_FIELD);
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_bad_base64() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.insert(WRAPPED_KEY_FIELD.into(), "!!not base64!!".into());
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_wrong_nonce_length() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.insert(NONCE_FIELD.into(), STANDARD.encode([0u8; 12]));
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_unknown_algorithm() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.insert(ALGORITHM_FIELD.into(), "AES/CBC/PKCS5Padding".into());
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_bad_description() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.insert(DESCRIPTION_FIELD.into(), "{key: k1}".into());
        assert_malformed(EnvelopeCodec::from_metadata(&metadata));
    }

    #[test]
    fn test_instruction_garbage() {
        assert_malformed(EnvelopeCodec::from_instruction(b"\x00\x01binary"));
        assert_malformed(EnvelopeCodec::from_instruction(br#"{"x-amz-iv":"AAAA"}"#));
    }

    #[test]
    fn test_strip_leaves_caller_metadata() {
        let mut metadata = EnvelopeCodec::to_metadata(&sample_envelope());
        metadata.insert("owner".into(), "alice".into());

        EnvelopeCodec::strip(&mut metadata);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["owner"], "alice");
    }
}
