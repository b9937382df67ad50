//! A flow's compiled operator chain: the head operator plus everything
//! downstream of it (each operator owns its own downstream link, see
//! [`crate::op`]). Owned as a unit by the [`crate::engine`] flow that
//! compiled it, and by the [`crate::stream::StreamManager`] subscriber
//! entry the flow attaches to the source stream.

use crate::err::Error;
use crate::op::Operator;
use crate::value::Value;

pub struct Pipeline {
	pub head: Option<Operator>,
}

impl Pipeline {
	pub fn new(head: Option<Operator>) -> Self {
		Self {
			head,
		}
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		match &mut self.head {
			Some(op) => op.push(record).await,
			None => Ok(()),
		}
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		match &mut self.head {
			Some(op) => op.flush().await,
			None => Ok(()),
		}
	}

	pub fn cancel(&mut self) {
		if let Some(op) = &mut self.head {
			op.cancel();
		}
	}
}
