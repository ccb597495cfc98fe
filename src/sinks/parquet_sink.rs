//! Columnar sink: a Parquet dataset directory with one file per chunk.
//!
//! Parquet files cannot be appended in place, so chunk `i` is written as
//! `<out>/<stem>.parquet/chunk_<i>.parquet`. The chunk index is part of the name and
//! an existing chunk file is never overwritten. Readers such as `pyarrow` or `polars`
//! load the directory as a single dataset.
//!
//! The Arrow schema is fixed by the first non-empty chunk and kept for the whole run,
//! so every chunk file of the dataset shares it. A column holding any text becomes
//! `Utf8`; every other column (numbers or only nulls) is stored as `Float64`. Null
//! cells are Arrow nulls. A later chunk whose columns differ from the schema, or that
//! puts text in a `Float64` column, is rejected with [`SurveyJoinError::SinkWrite`].
use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    sync::Arc,
};

use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::ArrowWriter;

use crate::{
    run_context::RunContext,
    sinks::SinkWriter,
    surveyjoin_errors::SurveyJoinError,
    table::{Table, Value},
};

#[derive(Debug)]
pub struct ParquetSink {
    dir: Utf8PathBuf,
    schema: Option<SchemaRef>,
}

impl ParquetSink {
    pub fn new(out_dir: &Utf8Path, stem: &str) -> Self {
        ParquetSink {
            dir: out_dir.join(format!("{stem}.parquet")),
            schema: None,
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn chunk_path(&self, chunk_index: usize) -> Utf8PathBuf {
        self.dir.join(format!("chunk_{chunk_index}.parquet"))
    }

    /// Schema shared by every chunk file, once the first chunk is written.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }
}

fn column_type(table: &Table, col: usize) -> DataType {
    if table.rows().iter().any(|r| matches!(r[col], Value::Text(_))) {
        DataType::Utf8
    } else {
        DataType::Float64
    }
}

/// Schema of a dataset whose first chunk is `table`.
pub(crate) fn infer_schema(table: &Table) -> SchemaRef {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| Field::new(name, column_type(table, i), true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn column_array(table: &Table, col: usize, field: &Field) -> Result<ArrayRef, String> {
    let cells = table.rows().iter().map(|r| &r[col]);
    match field.data_type() {
        DataType::Float64 => {
            let values = cells
                .map(|v| match v {
                    Value::Text(t) => Err(format!(
                        "column {} is stored as Float64 but holds the text value {t:?}",
                        field.name()
                    )),
                    other => Ok(other.as_f64()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Arc::new(Float64Array::from(values)))
        }
        _ => Ok(Arc::new(StringArray::from(
            cells
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<Vec<_>>(),
        ))),
    }
}

/// Convert a table into one Arrow record batch following `schema`.
///
/// Return
/// ----------
/// * The batch, or the reason the table does not fit the schema (different column
///   list, text in a numeric column).
pub(crate) fn to_record_batch(table: &Table, schema: &SchemaRef) -> Result<RecordBatch, String> {
    let expected: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    if table.columns().iter().map(String::as_str).ne(expected.iter().copied()) {
        return Err(format!(
            "chunk columns [{}] differ from the dataset columns [{}]",
            table.columns().join(", "),
            expected.join(", ")
        ));
    }
    let arrays = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| column_array(table, i, field))
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(schema.clone(), arrays).map_err(|e| e.to_string())
}

impl SinkWriter for ParquetSink {
    fn write(
        &mut self,
        _ctx: &mut RunContext,
        observations: &Table,
        chunk_index: usize,
    ) -> Result<usize, SurveyJoinError> {
        if observations.is_empty() {
            return Ok(0);
        }
        let path = self.chunk_path(chunk_index);
        let sink_err = |e: &dyn ToString| SurveyJoinError::sink(path.as_str(), e.to_string());

        let schema = self
            .schema
            .get_or_insert_with(|| infer_schema(observations))
            .clone();
        let batch = to_record_batch(observations, &schema).map_err(|e| sink_err(&e))?;

        fs::create_dir_all(&self.dir).map_err(|e| sink_err(&e))?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => sink_err(&"chunk file already exists"),
                _ => sink_err(&e),
            })?;

        let mut writer = ArrowWriter::try_new(file, schema, None).map_err(|e| sink_err(&e))?;
        writer.write(&batch).map_err(|e| sink_err(&e))?;
        writer.close().map_err(|e| sink_err(&e))?;
        Ok(batch.num_rows())
    }
}

#[cfg(test)]
mod parquet_sink_test {
    use std::fs::File;

    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    use super::*;

    fn chunk() -> Table {
        Table::with_rows(
            vec!["ObjID".into(), "FieldID".into(), "V".into()],
            vec![
                vec!["A".into(), Value::Int(1), Value::Float(19.5)],
                vec!["B".into(), Value::Int(2), Value::Int(20)],
                vec!["C".into(), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    fn chunk_file_schema(path: &Utf8Path) -> SchemaRef {
        ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .schema()
            .clone()
    }

    #[test]
    fn test_column_types() {
        let table = chunk();
        let batch = to_record_batch(&table, &infer_schema(&table)).unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(batch.num_rows(), 3);
    }

    #[test]
    fn test_schema_is_shared_across_chunks() {
        let dir = TempDir::new().unwrap();
        let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut ctx = RunContext::new("test");
        let mut sink = ParquetSink::new(&out, "run");

        let header: Vec<String> = vec!["ObjID".into(), "V".into(), "note".into()];
        let integers = Table::with_rows(
            header.clone(),
            vec![vec!["A".into(), Value::Int(20), Value::Null]],
        )
        .unwrap();
        let floats = Table::with_rows(
            header.clone(),
            vec![vec!["B".into(), Value::Float(20.5), Value::Null]],
        )
        .unwrap();
        sink.write(&mut ctx, &integers, 0).unwrap();
        sink.write(&mut ctx, &floats, 1).unwrap();

        let first = chunk_file_schema(&sink.chunk_path(0));
        let second = chunk_file_schema(&sink.chunk_path(1));
        assert_eq!(first, second);
        assert_eq!(first.field(1).data_type(), &DataType::Float64);
        assert_eq!(first.field(2).data_type(), &DataType::Float64);

        let text = Table::with_rows(header, vec![vec!["C".into(), "bright".into(), Value::Null]]).unwrap();
        let err = sink.write(&mut ctx, &text, 2).unwrap_err();
        assert!(matches!(err, SurveyJoinError::SinkWrite { .. }));
        assert!(!sink.chunk_path(2).exists());

        let other_columns = Table::with_rows(vec!["ObjID".into()], vec![vec!["D".into()]]).unwrap();
        let err = sink.write(&mut ctx, &other_columns, 3).unwrap_err();
        assert!(err.to_string().contains("differ from the dataset columns"));
    }

    #[test]
    fn test_chunks_are_distinct_files() {
        let dir = TempDir::new().unwrap();
        let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut ctx = RunContext::new("test");
        let mut sink = ParquetSink::new(&out, "run");

        sink.write(&mut ctx, &chunk(), 0).unwrap();
        sink.write(&mut ctx, &chunk(), 1).unwrap();
        assert!(sink.chunk_path(0).is_file());
        assert!(sink.chunk_path(1).is_file());

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(sink.chunk_path(1)).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);

        let err = sink.write(&mut ctx, &chunk(), 1).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
