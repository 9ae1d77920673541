//! CSV decoding of uploaded records.
//!
//! The header row is required and must name the columns
//! `id,nome,categoria,preco,estoque,fornecedor` (any order). Surrounding
//! whitespace in fields is trimmed. A single bad row fails the whole upload;
//! the engine never sees a partially decoded file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use catalog_reconcile_core::models::Record;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV at line {line}: {message}")]
    Row { line: u64, message: String },

    #[error("invalid CSV: {0}")]
    Format(String),
}

impl From<csv::Error> for DecodeError {
    fn from(err: csv::Error) -> Self {
        let message = match err.kind() {
            csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
            _ => err.to_string(),
        };
        match err.position() {
            Some(pos) => DecodeError::Row {
                line: pos.line(),
                message,
            },
            None => DecodeError::Format(message),
        }
    }
}

/// Decodes every row of `reader` into a [`Record`], in file order.
pub fn decode_records<R: Read>(reader: R) -> Result<Vec<Record>, DecodeError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in rdr.deserialize::<Record>() {
        records.push(row?);
    }
    Ok(records)
}

/// Opens and decodes a CSV file.
pub fn decode_file(path: &Path) -> Result<Vec<Record>, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode_records(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,nome,categoria,preco,estoque,fornecedor
1,Caneta Azul,Papelaria,2.5,300,Bic
2, Caderno ,Papelaria,15.90,40,Tilibra
";

    #[test]
    fn test_decodes_rows_in_order() {
        let records = decode_records(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].name, "Caneta Azul");
        assert_eq!(records[0].price, 2.5);
        assert_eq!(records[1].name, "Caderno");
        assert_eq!(records[1].stock, 40);
        assert_eq!(records[1].supplier, "Tilibra");
    }

    #[test]
    fn test_column_order_is_free() {
        let csv = "fornecedor,id,estoque,preco,categoria,nome\nBic,7,1,1.0,Papelaria,Lapis\n";
        let records = decode_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].id, 7);
        assert_eq!(records[0].name, "Lapis");
    }

    #[test]
    fn test_header_only_yields_no_records() {
        let csv = "id,nome,categoria,preco,estoque,fornecedor\n";
        assert!(decode_records(csv.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_bad_row_reports_line() {
        let csv = "id,nome,categoria,preco,estoque,fornecedor\n1,A,B,1.0,2,C\n2,A,B,cheap,2,C\n";
        match decode_records(csv.as_bytes()).unwrap_err() {
            DecodeError::Row { line, .. } => assert_eq!(line, 3),
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_fails() {
        let csv = "id,nome,categoria,preco,estoque\n1,A,B,1.0,2\n";
        assert!(decode_records(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_ragged_row_fails() {
        let csv = "id,nome,categoria,preco,estoque,fornecedor\n1,A,B,1.0,2\n";
        assert!(decode_records(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_file_missing() {
        let err = decode_file(Path::new("/nonexistent/upload.csv")).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }
}
