//! LanceDB-backed ANN index: one table per index name.

use std::path::Path;
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::{debug, info};

use policydb_core::error::{Error, Result};
use policydb_core::traits::IndexBackend;
use policydb_core::types::{BackendKind, IndexEntry, Meta, Metric, Passage, ScoredPassage, Vector};

use crate::similarity::{check_query_dim, from_distance, sort_and_truncate, validate_build};

fn lance_err(e: impl std::fmt::Display) -> Error { Error::Backend(format!("lancedb: {e}")) }

pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("sequence_index", DataType::Int64, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("metadata", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}

pub struct LanceIndex {
	conn: Connection,
	table_name: String,
	metric: Metric,
	dim: Option<usize>,
}

impl LanceIndex {
	pub async fn open(db_path: &Path, table_name: &str, metric: Metric, dim: Option<usize>) -> Result<Self> {
		let conn = connect(db_path.to_string_lossy().as_ref()).execute().await.map_err(lance_err)?;
		debug!(uri = %db_path.display(), table = table_name, "opened lancedb");
		Ok(Self { conn, table_name: table_name.to_string(), metric, dim })
	}

	async fn table(&self) -> Result<Option<Table>> {
		let names = self.conn.table_names().execute().await.map_err(lance_err)?;
		if !names.contains(&self.table_name) {
			return Ok(None);
		}
		Ok(Some(self.conn.open_table(&self.table_name).execute().await.map_err(lance_err)?))
	}

	fn distance_type(&self) -> DistanceType {
		match self.metric {
			Metric::Cosine => DistanceType::Cosine,
			Metric::L2 => DistanceType::L2,
		}
	}

	fn to_record_batch(passages: &[Passage], vectors: &[Vector], dim: usize) -> Result<RecordBatch> {
		let mut seq = Vec::with_capacity(passages.len());
		let mut sources = Vec::with_capacity(passages.len());
		let mut texts = Vec::with_capacity(passages.len());
		let mut metas = Vec::with_capacity(passages.len());
		for p in passages {
			seq.push(p.sequence_index as i64);
			sources.push(p.source.clone());
			texts.push(p.text.clone());
			metas.push(serde_json::to_string(&p.metadata)?);
		}
		let vecs = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
		RecordBatch::try_new(
			build_arrow_schema(dim),
			vec![
				Arc::new(Int64Array::from(seq)),
				Arc::new(StringArray::from(sources)),
				Arc::new(StringArray::from(texts)),
				Arc::new(StringArray::from(metas)),
				Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vecs, dim as i32)),
			],
		)
		.map_err(lance_err)
	}
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::Backend(format!("lancedb: column `{name}` missing or mistyped")))
}

fn passage_at(batch: &RecordBatch, i: usize) -> Result<Passage> {
	let seq = column::<Int64Array>(batch, "sequence_index")?.value(i);
	let meta: Meta = serde_json::from_str(column::<StringArray>(batch, "metadata")?.value(i))?;
	Ok(Passage {
		text: column::<StringArray>(batch, "text")?.value(i).to_string(),
		sequence_index: usize::try_from(seq).map_err(lance_err)?,
		source: column::<StringArray>(batch, "source")?.value(i).to_string(),
		metadata: meta,
	})
}

#[async_trait]
impl IndexBackend for LanceIndex {
	fn name(&self) -> &str { &self.table_name }
	fn kind(&self) -> BackendKind { BackendKind::Lance }
	fn dim(&self) -> Option<usize> { self.dim }

	async fn build(&mut self, passages: Vec<Passage>, vectors: Vec<Vector>) -> Result<()> {
		let existing = self.count().await?;
		if existing > 0 {
			debug!(table = %self.table_name, rows = existing, "lance table already populated; skipping build");
			return Ok(());
		}
		let dim = validate_build(&passages, &vectors, self.dim)?;
		let batch = Self::to_record_batch(&passages, &vectors, dim)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		match self.table().await? {
			Some(t) => { t.add(reader).execute().await.map_err(lance_err)?; }
			None => { self.conn.create_table(&self.table_name, reader).execute().await.map_err(lance_err)?; }
		}
		self.dim = Some(dim);
		info!(table = %self.table_name, rows = passages.len(), dim, "built lance index");
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		if k == 0 || table.count_rows(None).await.map_err(lance_err)? == 0 {
			return Ok(Vec::new());
		}
		check_query_dim(vector, self.dim)?;
		let mut stream = table
			.vector_search(vector.to_vec())
			.map_err(lance_err)?
			.distance_type(self.distance_type())
			.limit(k)
			.execute()
			.await
			.map_err(lance_err)?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
			let distances = column::<Float32Array>(&batch, "_distance")?;
			for i in 0..batch.num_rows() {
				let sim = from_distance(self.metric, distances.value(i));
				hits.push(ScoredPassage::from_similarity(passage_at(&batch, i)?, sim));
			}
		}
		sort_and_truncate(&mut hits, k);
		Ok(hits)
	}

	async fn count(&self) -> Result<usize> {
		match self.table().await? {
			Some(t) => t.count_rows(None).await.map_err(lance_err),
			None => Ok(0),
		}
	}

	async fn entries(&self) -> Result<Vec<IndexEntry>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		let rows = table.count_rows(None).await.map_err(lance_err)?;
		if rows == 0 {
			return Ok(Vec::new());
		}
		let mut stream = table.query().limit(rows).execute().await.map_err(lance_err)?;
		let mut out = Vec::with_capacity(rows);
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
			let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
			for i in 0..batch.num_rows() {
				let values = vectors.value(i);
				let floats = values
					.as_any()
					.downcast_ref::<Float32Array>()
					.ok_or_else(|| Error::Backend("lancedb: vector items are not f32".into()))?;
				out.push(IndexEntry { passage: passage_at(&batch, i)?, vector: floats.values().to_vec() });
			}
		}
		out.sort_by_key(|e| e.passage.sequence_index);
		Ok(out)
	}
}
