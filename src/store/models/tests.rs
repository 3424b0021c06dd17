use super::*;
use chrono::Utc;

fn sample_new_record() -> NewChunkRecord {
    NewChunkRecord {
        document_id: "doc-42".to_string(),
        chunk_index: 3,
        chunk_text: "some chunk text".to_string(),
        embedding: vec![0.25, -0.5, 1.0],
        metadata: HashMap::from([("user_id".to_string(), "7".to_string())]),
        vector_id: 99,
    }
}

#[test]
fn chunk_id_is_document_and_index() {
    let record = sample_new_record();
    assert_eq!(record.chunk_id(), "doc-42_3");
}

#[test]
fn row_decodes_json_columns() {
    let row = ChunkRow {
        chunk_id: "doc-42_3".to_string(),
        document_id: "doc-42".to_string(),
        chunk_index: 3,
        chunk_text: "some chunk text".to_string(),
        embedding: "[0.25,-0.5,1.0]".to_string(),
        metadata: r#"{"user_id":"7"}"#.to_string(),
        vector_id: 99,
        created_date: Utc::now().naive_utc(),
    };

    let record = ChunkRecord::try_from(row).expect("conversion should succeed");

    assert_eq!(record.embedding, vec![0.25, -0.5, 1.0]);
    assert_eq!(record.metadata.get("user_id"), Some(&"7".to_string()));
    assert_eq!(record.vector_id, 99);
}

#[test]
fn malformed_embedding_json_is_an_error() {
    let row = ChunkRow {
        chunk_id: "doc-42_3".to_string(),
        document_id: "doc-42".to_string(),
        chunk_index: 3,
        chunk_text: "some chunk text".to_string(),
        embedding: "not json".to_string(),
        metadata: "{}".to_string(),
        vector_id: 99,
        created_date: Utc::now().naive_utc(),
    };

    assert!(ChunkRecord::try_from(row).is_err());
}
