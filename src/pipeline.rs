//! Lazy record pipelines.
//!
//! A [`DataSource`] hands out [`Cursor`]s. Piping a source into a [`Stage`]
//! yields a [`Chained`] source whose cursor asks the stage for the next
//! output, and the stage in turn pulls from the upstream cursor:
//!
//! ```text
//! source.pipe(a).pipe(b).pipe(sink)
//! ```
//!
//! Nothing runs until the terminal consumer ([`drain`]) pulls a record, and
//! exactly one record is in flight across the whole chain at a time.
//!
//! A stage is either a [`Transformer`], which maps each record to exactly one
//! record, or a [`Filter`], which keeps pulling until a record passes its
//! test. Errors that abort the chain (see [`PipelineError::aborts_chain`])
//! pass through untouched. Any other error raised by a stage is handed to
//! the upstream cursor, which either turns it into a fatal error or lets the
//! record be dropped.

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::record::Record;

/// Read marker over a stream of records.
pub trait Cursor {
    /// Produce the next record, or `None` once the stream is exhausted.
    ///
    /// An `Err` returned from here is final; downstream stages forward it
    /// without consulting any policy.
    fn advance(&mut self) -> Option<Result<Record>>;

    /// Decide the fate of a per-record error raised by a downstream stage.
    ///
    /// Returning `Some` makes the error fatal; `None` drops the record that
    /// caused it and lets the stream continue.
    fn escalate(&mut self, err: PipelineError) -> Option<PipelineError>;
}

/// A stream of records that can be iterated from the start on request.
pub trait DataSource {
    /// Open a fresh cursor positioned before the first record.
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>>;

    /// Release buffered state after the stream has been fully consumed.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Names of the stages between the root source and this one.
    fn stage_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Compose this source with a stage.
    fn pipe(self, stage: Stage) -> Chained<Self>
    where
        Self: Sized,
    {
        Chained::new(self, stage)
    }
}

/// A stage that maps every record to exactly one record.
pub trait Transformer {
    fn transform(&mut self, record: Record) -> Result<Record>;

    /// Called once after the stream is exhausted.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// The display name of this stage.
    fn name(&self) -> &str;
}

/// A stage that passes through only the records satisfying a test.
pub trait Filter {
    fn test(&mut self, record: &Record) -> Result<bool>;

    /// The display name of this stage.
    fn name(&self) -> &str;
}

/// One step of a pipeline.
pub enum Stage {
    Transform(Box<dyn Transformer>),
    Filter(Box<dyn Filter>),
}

/// Result of asking a stage for one output record.
enum Pulled {
    Record(Record),
    /// Error already surfaced by the upstream cursor.
    Upstream(PipelineError),
    /// Error raised by the stage's own per-record logic.
    Step(PipelineError),
}

impl Stage {
    pub fn transform(transformer: impl Transformer + 'static) -> Self {
        Stage::Transform(Box::new(transformer))
    }

    pub fn filter(filter: impl Filter + 'static) -> Self {
        Stage::Filter(Box::new(filter))
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Transform(t) => t.name(),
            Stage::Filter(f) => f.name(),
        }
    }

    fn process(&mut self, upstream: &mut dyn Cursor) -> Option<Pulled> {
        match self {
            Stage::Transform(transformer) => {
                let record = match upstream.advance()? {
                    Ok(record) => record,
                    Err(e) => return Some(Pulled::Upstream(e)),
                };
                Some(match transformer.transform(record) {
                    Ok(record) => Pulled::Record(record),
                    Err(e) => Pulled::Step(e),
                })
            }
            Stage::Filter(filter) => loop {
                let record = match upstream.advance()? {
                    Ok(record) => record,
                    Err(e) => return Some(Pulled::Upstream(e)),
                };
                match filter.test(&record) {
                    Ok(true) => return Some(Pulled::Record(record)),
                    Ok(false) => continue,
                    Err(e) => return Some(Pulled::Step(e)),
                }
            },
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Stage::Transform(t) => t.flush(),
            Stage::Filter(_) => Ok(()),
        }
    }
}

/// A source composed with one stage; itself a source.
pub struct Chained<S> {
    source: S,
    stage: Stage,
}

impl<S: DataSource> Chained<S> {
    pub fn new(source: S, stage: Stage) -> Self {
        Self { source, stage }
    }
}

impl<S: DataSource> DataSource for Chained<S> {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        let upstream = self.source.cursor()?;
        Ok(Box::new(ChainedCursor {
            upstream,
            stage: &mut self.stage,
        }))
    }

    fn flush(&mut self) -> Result<()> {
        self.source.flush()?;
        self.stage.flush()
    }

    fn stage_names(&self) -> Vec<String> {
        let mut names = self.source.stage_names();
        names.push(self.stage.name().to_string());
        names
    }
}

struct ChainedCursor<'a> {
    upstream: Box<dyn Cursor + 'a>,
    stage: &'a mut Stage,
}

impl Cursor for ChainedCursor<'_> {
    fn advance(&mut self) -> Option<Result<Record>> {
        loop {
            match self.stage.process(self.upstream.as_mut())? {
                Pulled::Record(record) => return Some(Ok(record)),
                Pulled::Upstream(e) => return Some(Err(e)),
                Pulled::Step(e) if e.aborts_chain() => return Some(Err(e)),
                Pulled::Step(e) => match self.upstream.escalate(e) {
                    Some(fatal) => return Some(Err(fatal)),
                    None => {
                        warn!(stage = self.stage.name(), "dropping record after stage error");
                    }
                },
            }
        }
    }

    fn escalate(&mut self, err: PipelineError) -> Option<PipelineError> {
        self.upstream.escalate(err)
    }
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        (**self).cursor()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn stage_names(&self) -> Vec<String> {
        (**self).stage_names()
    }
}

/// Pipe `source` through every stage in order.
pub fn chain_all<S>(source: S, stages: Vec<Stage>) -> Box<dyn DataSource>
where
    S: DataSource + 'static,
{
    stages
        .into_iter()
        .fold(Box::new(source) as Box<dyn DataSource>, |chain, stage| {
            Box::new(chain.pipe(stage))
        })
}

/// Pull every record through the chain, then flush every stage.
///
/// Returns the number of records that reached the end of the chain.
pub fn drain<S: DataSource>(source: &mut S) -> Result<usize> {
    let mut count = 0;
    {
        let mut cursor = source.cursor()?;
        while let Some(record) = cursor.advance() {
            record?;
            count += 1;
        }
    }
    debug!(count, "pipeline exhausted, flushing stages");
    source.flush()?;
    Ok(count)
}

/// Pull every record through the chain and keep them, then flush.
pub fn collect_records<S: DataSource>(source: &mut S) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    {
        let mut cursor = source.cursor()?;
        while let Some(record) = cursor.advance() {
            records.push(record?);
        }
    }
    source.flush()?;
    Ok(records)
}
