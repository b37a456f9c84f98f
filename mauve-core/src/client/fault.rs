//! # Faults
//!
//! A [`Fault`] is what a transport reports when it cannot produce a result. It is either a
//! single cause wrapping any error type, or an aggregate of other faults (for example one
//! rejection per SMTP recipient). Aggregates may nest arbitrarily.
//!
//! The envelope only ever shows the *leaves* of that tree. [`Fault::leaves`] walks it
//! depth-first, in the order the causes were added, and [`Fault`]'s `Display` joins the leaf
//! messages with a single space.
use crate::BoxError;
use std::fmt;

/// Message of an aggregate that holds no causes.
const EMPTY_AGGREGATE_MESSAGE: &str = "One or more errors occurred.";

#[derive(Debug)]
pub enum Fault {
    /// A single cause.
    Cause(BoxError),
    /// A group of faults reported together.
    Aggregate(Vec<Fault>),
}

impl Fault {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Fault::Cause(error.into())
    }

    pub fn aggregate(faults: impl IntoIterator<Item = Fault>) -> Self {
        Fault::Aggregate(faults.into_iter().collect())
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Fault::Aggregate(_))
    }

    /// Returns the leaf faults in depth-first order.
    ///
    /// A leaf is a [`Fault::Cause`] or an aggregate without children.
    pub fn leaves(&self) -> Vec<&Fault> {
        let mut leaves = Vec::new();
        let mut pending = vec![self];

        while let Some(fault) = pending.pop() {
            match fault {
                Fault::Aggregate(children) if !children.is_empty() => {
                    pending.extend(children.iter().rev());
                }
                leaf => leaves.push(leaf),
            }
        }

        leaves
    }

    /// Returns the message of every leaf, in [`Fault::leaves`] order.
    pub fn messages(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .map(|leaf| match leaf {
                Fault::Cause(err) => err.to_string(),
                Fault::Aggregate(_) => EMPTY_AGGREGATE_MESSAGE.to_string(),
            })
            .collect()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(" "))
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Fault::Cause(Box::new(err))
    }
}
