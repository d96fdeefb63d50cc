use bytes::Bytes;
use proptest::prelude::*;
use ryos_snapshot::codec::blob::{self, decode_record, encode_record};
use ryos_snapshot::codec::gzip::{self, ChunkCompressor, ChunkDecompressor};
use ryos_snapshot::error::SnapshotError;
use ryos_snapshot::models::record::{json_record, StoredField};
use ryos_snapshot::models::snapshot::{BlobField, StoreRecord};
use serde_json::json;

// ==================== Blob Tests ====================

proptest! {
    #[test]
    fn blob_decode_inverts_encode(
        bytes in proptest::collection::vec(any::<u8>(), 0..2048),
        mime in "[a-z]{1,10}/[a-z0-9.+-]{1,20}",
    ) {
        let field = blob::encode(&bytes, &mime);
        prop_assert_eq!(&field.mime, &mime);
        prop_assert_eq!(blob::decode(&field).unwrap(), Bytes::from(bytes));
    }

    #[test]
    fn blob_survives_data_url_text(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let field = blob::encode(&bytes, "application/pdf");
        let parsed = BlobField::from_data_url(&field.to_data_url());
        prop_assert_eq!(blob::decode(&parsed).unwrap(), Bytes::from(bytes));
    }
}

#[test]
fn test_empty_blob_round_trips() {
    let field = blob::encode(&[], "text/plain");
    assert_eq!(field.to_data_url(), "data:text/plain;base64,");
    assert!(blob::decode(&field).unwrap().is_empty());
}

#[test]
fn test_malformed_blob_is_rejected() {
    let field = BlobField {
        mime: "image/png".into(),
        encoded_bytes: "not*base64!".into(),
    };
    assert!(matches!(
        blob::decode(&field),
        Err(SnapshotError::MalformedBlob(_))
    ));
}

#[test]
fn test_record_wire_shape_flags_blob_fields() {
    let mut value = json_record([("name", json!("cat.png")), ("size", json!(4))]);
    value.insert(
        "content".into(),
        StoredField::Binary {
            mime: "image/png".into(),
            data: Bytes::from_static(b"\x89PNG"),
        },
    );

    let wire = serde_json::to_value(encode_record("k1", &value)).unwrap();
    assert_eq!(wire["key"], "k1");
    assert_eq!(wire["value"]["name"], "cat.png");
    assert_eq!(wire["value"]["_isBlob_content"], true);
    assert_eq!(wire["value"]["content"], "data:image/png;base64,iVBORw==");
    assert!(wire["value"].get("_isBlob_name").is_none());

    let record: StoreRecord = serde_json::from_value(wire).unwrap();
    let (key, decoded) = decode_record(record).unwrap();
    assert_eq!(key, "k1");
    assert_eq!(decoded, value);
}

#[test]
fn test_unflagged_data_url_stays_text() {
    let record: StoreRecord = serde_json::from_value(json!({
        "key": "note",
        "value": {"content": "data:text/plain;base64,aGk="}
    }))
    .unwrap();
    let (_, value) = decode_record(record).unwrap();
    assert_eq!(
        value["content"],
        StoredField::Json(json!("data:text/plain;base64,aGk="))
    );
}

#[test]
fn test_blob_prefixed_fields_that_are_not_flags_survive() {
    let wire = json!({
        "key": "odd",
        "value": {
            "_isBlob_": "keep",
            "_isBlob_note": false,
            "_isBlob_missing": true,
            "name": "x"
        }
    });
    let record: StoreRecord = serde_json::from_value(wire.clone()).unwrap();
    let (key, value) = decode_record(record).unwrap();
    assert_eq!(key, "odd");
    assert_eq!(value.len(), 4);
    assert_eq!(value["_isBlob_"], StoredField::Json(json!("keep")));
    assert_eq!(value["_isBlob_note"], StoredField::Json(json!(false)));
    assert_eq!(value["_isBlob_missing"], StoredField::Json(json!(true)));

    let back = serde_json::to_value(encode_record(&key, &value)).unwrap();
    assert_eq!(back, wire);
}

// ==================== Gzip Tests ====================

fn large_payload(len: usize) -> Vec<u8> {
    // Pseudo-random but compressible enough to keep the test fast.
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|i| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            if i % 7 == 0 {
                (state >> 16) as u8
            } else {
                b'a' + (i % 26) as u8
            }
        })
        .collect()
}

#[test]
fn test_ten_megabytes_in_64k_chunks() {
    let payload = large_payload(10 * 1024 * 1024);
    let chunk = 64 * 1024;

    let mut compressor = ChunkCompressor::new(6);
    let mut compressed = Vec::new();
    let mut largest_output = 0;
    for piece in payload.chunks(chunk) {
        let out = compressor.push(piece).unwrap();
        largest_output = largest_output.max(out.len());
        compressed.extend_from_slice(&out);
    }
    let (tail, stats) = compressor.finish().unwrap();
    compressed.extend_from_slice(&tail);

    assert_eq!(stats.bytes_in, payload.len() as u64);
    assert_eq!(stats.bytes_out, compressed.len() as u64);
    assert!(largest_output <= 2 * chunk);
    assert!(gzip::is_gzip(&compressed));

    let mut decompressor = ChunkDecompressor::new();
    let mut restored = Vec::with_capacity(payload.len());
    for piece in compressed.chunks(chunk) {
        restored.extend_from_slice(&decompressor.push(piece).unwrap());
    }
    let (tail, _) = decompressor.finish().unwrap();
    restored.extend_from_slice(&tail);

    assert_eq!(restored, payload);
}

#[test]
fn test_truncated_stream_fails() {
    let compressed = gzip::compress(&large_payload(200_000), 6, 4096).unwrap();
    let truncated = &compressed[..compressed.len() - 10];
    assert!(matches!(
        gzip::decompress(truncated, 4096),
        Err(SnapshotError::Decompression(_))
    ));
}

#[test]
fn test_empty_stream_fails() {
    assert!(matches!(
        gzip::decompress(&[], 4096),
        Err(SnapshotError::Decompression(_))
    ));
}

#[test]
fn test_plain_text_is_not_gzip() {
    assert!(!gzip::is_gzip(b"{\"version\":2}"));
    assert!(matches!(
        gzip::decompress(b"{\"version\":2}", 4096),
        Err(SnapshotError::Decompression(_))
    ));
}

#[test]
fn test_compression_disabled_is_unavailable() {
    assert!(matches!(
        ChunkCompressor::open(false, 6),
        Err(SnapshotError::CompressionUnavailable)
    ));
    assert!(ChunkCompressor::open(true, 6).is_ok());
}

#[tokio::test]
async fn test_stream_round_trip_through_duplex() {
    let payload = large_payload(1024 * 1024);
    let (writer, mut reader) = tokio::io::duplex(16 * 1024);

    let source = std::io::Cursor::new(payload.clone());
    let producer = tokio::spawn(async move {
        gzip::compress_stream(ChunkCompressor::new(6), source, writer, 16 * 1024).await
    });

    let mut restored = Vec::new();
    gzip::decompress_stream(&mut reader, &mut restored, 16 * 1024)
        .await
        .unwrap();
    let stats = producer.await.unwrap().unwrap();

    assert_eq!(stats.bytes_in, payload.len() as u64);
    assert_eq!(restored, payload);
}
