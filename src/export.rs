use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::pipeline::AnalysisResult;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write the PCA scores of every sample.  Dispatch by extension.
///
/// Columns: `file, class, family, grade, ra, label, merged_label, half_label,
/// pc1 .. pck`. `label` is the class index, `merged_label` the grade index
/// shared by both families, and `half_label` the grade index for the rows of
/// the first half of the classes (empty for the others).
///
/// Supported formats:
/// * `.csv`
/// * `.parquet` / `.pq`
pub fn export_projections(path: &Path, result: &AnalysisResult) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => export_csv(path, result),
        "parquet" | "pq" => export_parquet(path, result),
        other => bail!("Unsupported export extension: .{other}"),
    }?;

    log::info!(
        "Exported {} projections to {}",
        result.dataset.len(),
        path.display()
    );
    Ok(())
}

/// Class, merged and half label of every row.
struct LabelColumns<'a> {
    full: &'a [usize],
    merged: Vec<usize>,
    half: Vec<usize>,
}

impl<'a> LabelColumns<'a> {
    fn new(result: &'a AnalysisResult) -> Self {
        let ds = &result.dataset;
        LabelColumns {
            full: ds.labels_full(),
            merged: ds.labels_merged(),
            half: ds.labels_half(),
        }
    }

    fn half(&self, row: usize) -> Option<usize> {
        self.half.get(row).copied()
    }
}

const LABEL_HEADER: [&str; 8] = [
    "file",
    "class",
    "family",
    "grade",
    "ra",
    "label",
    "merged_label",
    "half_label",
];

fn component_names(result: &AnalysisResult) -> Vec<String> {
    (1..=result.projections.ncols())
        .map(|i| format!("pc{i}"))
        .collect()
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

fn export_csv(path: &Path, result: &AnalysisResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;

    let mut header: Vec<String> = LABEL_HEADER
        .iter()
        .map(|h| h.to_string())
        .collect();
    header.extend(component_names(result));
    writer.write_record(&header).context("writing CSV header")?;

    let ds = &result.dataset;
    let labels = LabelColumns::new(result);
    for (row, scores) in result.projections.rows().into_iter().enumerate() {
        let class = ds.class_of(row);
        let mut record = vec![
            ds.file_names[row].clone(),
            class.name.clone(),
            class.family.to_string(),
            class.grade.to_string(),
            class.ra.to_string(),
            labels.full[row].to_string(),
            labels.merged[row].to_string(),
            labels.half(row).map(|l| l.to_string()).unwrap_or_default(),
        ];
        record.extend(scores.iter().map(|v| v.to_string()));
        writer
            .write_record(&record)
            .with_context(|| format!("writing CSV row {row}"))?;
    }

    writer.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

fn export_parquet(path: &Path, result: &AnalysisResult) -> Result<()> {
    let ds = &result.dataset;
    let n = ds.len();

    let mut fields = vec![
        Field::new("file", DataType::Utf8, false),
        Field::new("class", DataType::Utf8, false),
        Field::new("family", DataType::Utf8, false),
        Field::new("grade", DataType::Int64, false),
        Field::new("ra", DataType::Float64, false),
        Field::new("label", DataType::Int64, false),
        Field::new("merged_label", DataType::Int64, false),
        Field::new("half_label", DataType::Int64, true),
    ];
    let labels = LabelColumns::new(result);
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            ds.file_names.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            (0..n).map(|r| ds.class_of(r).name.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            (0..n)
                .map(|r| ds.class_of(r).family.to_string())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            (0..n)
                .map(|r| ds.class_of(r).grade as i64)
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            (0..n).map(|r| ds.class_of(r).ra).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            labels.full.iter().map(|&l| l as i64).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            labels.merged.iter().map(|&l| l as i64).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            (0..n)
                .map(|r| labels.half(r).map(|l| l as i64))
                .collect::<Vec<Option<i64>>>(),
        )),
    ];

    for (name, scores) in component_names(result)
        .into_iter()
        .zip(result.projections.columns())
    {
        fields.push(Field::new(name, DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(scores.to_vec())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
