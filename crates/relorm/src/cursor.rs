//! Forward-only record cursor over a prepared statement.

use crate::adapter::RowAdapter;
use crate::database::Database;
use crate::error::{OrmError, OrmResult};
use crate::monitor::{ExecMode, QueryContext, QueryResult};
use crate::row::{FromRow, Row};
use crate::trace::debug_event;
use crate::value::Value;
use rusqlite::{CachedStatement, Rows};
use std::fmt;
use std::marker::PhantomData;
use std::time::Instant;

enum CursorState<'p> {
    Idle,
    Busy {
        rows: Rows<'p>,
        ctx: QueryContext,
        started: Instant,
        fetched: usize,
    },
    Done,
    Failed,
}

impl CursorState<'_> {
    fn name(&self) -> &'static str {
        match self {
            CursorState::Idle => "idle",
            CursorState::Busy { .. } => "busy",
            CursorState::Done => "done",
            CursorState::Failed => "failed",
        }
    }
}

/// Steps a prepared statement and decodes one record per row.
///
/// The statement runs on the first call to [`try_next`](Self::try_next). Once the cursor has
/// returned `None` (or failed) it keeps returning `None`. Dropping a cursor that is still
/// stepping resets the statement and reports the early stop to hooks and monitors as
/// [`QueryResult::Abandoned`].
///
/// Rows are decoded from a single buffer that is refilled in place, so records copy what
/// they keep.
pub struct RecordCursor<'p, 'db, R> {
    db: &'db Database,
    statement: Option<&'p mut CachedStatement<'db>>,
    sql: &'p str,
    arguments: &'p [Value],
    adapter: &'p RowAdapter,
    buffer: Row,
    state: CursorState<'p>,
    _marker: PhantomData<fn() -> R>,
}

enum Step {
    Row,
    End,
    Failed(OrmError),
}

impl<'p, 'db, R> RecordCursor<'p, 'db, R> {
    pub(crate) fn new(
        db: &'db Database,
        statement: &'p mut CachedStatement<'db>,
        sql: &'p str,
        arguments: &'p [Value],
        adapter: &'p RowAdapter,
    ) -> Self {
        Self {
            db,
            statement: Some(statement),
            sql,
            arguments,
            adapter,
            buffer: adapter.empty_row(),
            state: CursorState::Idle,
            _marker: PhantomData,
        }
    }

    /// SQL of the underlying statement.
    pub fn sql(&self) -> &str {
        self.sql
    }

    /// Whether the cursor has returned its last row.
    pub fn is_done(&self) -> bool {
        matches!(self.state, CursorState::Done)
    }

    fn start(&mut self) -> OrmResult<()> {
        let mut ctx = QueryContext::new(self.sql, self.arguments.len(), ExecMode::Cursor);
        if let Err(err) = self.db.will_execute(&mut ctx) {
            self.state = CursorState::Failed;
            return Err(err);
        }
        let Some(statement) = self.statement.take() else {
            self.state = CursorState::Failed;
            return Err(OrmError::usage("cursor statement was already consumed"));
        };

        let started = Instant::now();
        for (index, value) in self.arguments.iter().enumerate() {
            if let Err(source) = statement.raw_bind_parameter(index + 1, value) {
                let err = OrmError::engine(source, self.sql, self.arguments);
                self.state = CursorState::Failed;
                self.db.did_fail(&ctx, started.elapsed(), &err);
                return Err(err);
            }
        }

        debug_event!(sql = %self.sql, arguments = self.arguments.len(), "cursor started");
        self.state = CursorState::Busy {
            rows: statement.raw_query(),
            ctx,
            started,
            fetched: 0,
        };
        Ok(())
    }

    /// Step once and refill the row buffer.
    ///
    /// Returns `Ok(false)` at the end of the rows.
    pub(crate) fn advance(&mut self) -> OrmResult<bool> {
        match self.state {
            CursorState::Idle => self.start()?,
            CursorState::Busy { .. } => {}
            CursorState::Done | CursorState::Failed => return Ok(false),
        }

        let CursorState::Busy { rows, fetched, .. } = &mut self.state else {
            return Ok(false);
        };
        let step = match rows.next() {
            Ok(Some(row)) => match self.adapter.fill(row, &mut self.buffer) {
                Ok(()) => {
                    *fetched += 1;
                    Step::Row
                }
                Err(err) => Step::Failed(err),
            },
            Ok(None) => Step::End,
            Err(source) => Step::Failed(OrmError::engine(source, self.sql, self.arguments)),
        };

        match step {
            Step::Row => Ok(true),
            Step::End => {
                // dropping `rows` resets the statement
                if let CursorState::Busy {
                    ctx, started, fetched, ..
                } = std::mem::replace(&mut self.state, CursorState::Done)
                {
                    debug_event!(rows = fetched, "cursor done");
                    self.db
                        .did_execute(&ctx, started.elapsed(), QueryResult::Rows(fetched));
                }
                Ok(false)
            }
            Step::Failed(err) => {
                if let CursorState::Busy { ctx, started, .. } =
                    std::mem::replace(&mut self.state, CursorState::Failed)
                {
                    self.db.did_fail(&ctx, started.elapsed(), &err);
                }
                Err(err)
            }
        }
    }

    /// Stop after the rows the caller needed, reporting a normal completion.
    pub(crate) fn finish(mut self) {
        if let CursorState::Busy {
            ctx, started, fetched, ..
        } = std::mem::replace(&mut self.state, CursorState::Done)
        {
            self.db
                .did_execute(&ctx, started.elapsed(), QueryResult::Rows(fetched));
        }
    }

    /// The buffer holding the current row.
    pub(crate) fn current(&self) -> &Row {
        &self.buffer
    }
}

impl<R: FromRow> RecordCursor<'_, '_, R> {
    /// Decode the next record, or `None` once the rows are exhausted.
    ///
    /// Decoding errors leave the cursor usable; engine errors end it.
    pub fn try_next(&mut self) -> OrmResult<Option<R>> {
        if self.advance()? {
            R::from_row(&self.buffer).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<R: FromRow> Iterator for RecordCursor<'_, '_, R> {
    type Item = OrmResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl<R> Drop for RecordCursor<'_, '_, R> {
    fn drop(&mut self) {
        if let CursorState::Busy {
            ctx, started, fetched, ..
        } = &self.state
        {
            debug_event!(rows = *fetched, "cursor abandoned");
            self.db.did_abandon(ctx, started.elapsed(), *fetched);
        }
    }
}

impl<R> fmt::Debug for RecordCursor<'_, '_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCursor")
            .field("sql", &self.sql)
            .field("state", &self.state.name())
            .finish()
    }
}
