//! The pipeline operator runtime: a closed sum type of operator kinds
//! rather than a trait object, so the hot path of handing a record to the
//! next operator is a direct match-and-call instead of a virtual
//! dispatch. Every kind shares the same contract: `push` consumes one
//! record, `flush` drains state and propagates downstream, `cancel` tears
//! down without propagating further records.

pub mod filter;
pub mod scan;
pub mod select;
pub mod sink;
pub mod sorter;
pub mod summarize;

use crate::err::Error;
use crate::value::Value;
use futures::future::BoxFuture;

pub enum Operator {
	Filter(filter::FilterOp),
	Select(select::SelectOp),
	Scan(scan::ScanOp),
	Sorter(sorter::SorterOp),
	Summarize(summarize::SummarizeOp),
	InsertInto(sink::InsertIntoOp),
	WriteToFile(sink::WriteToFileOp),
	AssertOrSaveExpected(sink::AssertOrSaveOp),
	Collect(sink::CollectOp),
}

impl Operator {
	/// Boxed because operators form a chain through `downstream`: each
	/// `push` awaits the next one's `push`, which would otherwise make the
	/// future's type recurse through `Operator` indefinitely. Boxing here is
	/// what breaks that cycle, not the absence of a `dyn Trait`.
	pub fn push(&mut self, record: Value) -> BoxFuture<'_, Result<(), Error>> {
		Box::pin(async move {
			match self {
				Operator::Filter(op) => op.push(record).await,
				Operator::Select(op) => op.push(record).await,
				Operator::Scan(op) => op.push(record).await,
				Operator::Sorter(op) => op.push(record).await,
				Operator::Summarize(op) => op.push(record).await,
				Operator::InsertInto(op) => op.push(record).await,
				Operator::WriteToFile(op) => op.push(record).await,
				Operator::AssertOrSaveExpected(op) => op.push(record).await,
				Operator::Collect(op) => op.push(record).await,
			}
		})
	}

	pub fn flush(&mut self) -> BoxFuture<'_, Result<(), Error>> {
		Box::pin(async move {
			match self {
				Operator::Filter(op) => op.flush().await,
				Operator::Select(op) => op.flush().await,
				Operator::Scan(op) => op.flush().await,
				Operator::Sorter(op) => op.flush().await,
				Operator::Summarize(op) => op.flush().await,
				Operator::InsertInto(op) => op.flush().await,
				Operator::WriteToFile(op) => op.flush().await,
				Operator::AssertOrSaveExpected(op) => op.flush().await,
				Operator::Collect(op) => op.flush().await,
			}
		})
	}

	pub fn cancel(&mut self) {
		match self {
			Operator::Filter(op) => op.cancel(),
			Operator::Select(op) => op.cancel(),
			Operator::Scan(op) => op.cancel(),
			Operator::Sorter(op) => op.cancel(),
			Operator::Summarize(op) => op.cancel(),
			Operator::InsertInto(op) => op.cancel(),
			Operator::WriteToFile(op) => op.cancel(),
			Operator::AssertOrSaveExpected(op) => op.cancel(),
			Operator::Collect(op) => op.cancel(),
		}
	}
}

/// Hands a record to the downstream neighbor, if there is one; the tail
/// operator of a pipeline has none and the record is simply dropped after
/// whatever terminal effect it already had (a sink's write, a log entry).
pub(crate) async fn emit(downstream: &mut Option<Box<Operator>>, record: Value) -> Result<(), Error> {
	match downstream {
		Some(next) => next.push(record).await,
		None => Ok(()),
	}
}

pub(crate) async fn flush_downstream(downstream: &mut Option<Box<Operator>>) -> Result<(), Error> {
	match downstream {
		Some(next) => next.flush().await,
		None => Ok(()),
	}
}

pub(crate) fn cancel_downstream(downstream: &mut Option<Box<Operator>>) {
	if let Some(next) = downstream {
		next.cancel();
	}
}
