//! One retrieval session: paginate, optionally expand context, print

use std::io::Write;

use tracing::{error, info};

use lokicli_types::{
    ContextRequest, LokiError, MAX_CONTEXT, MAX_LIMIT, QuerySpec, Result, TimeWindow,
};

use crate::context::{ContextFetcher, PendingGroup};
use crate::highlight::Presenter;
use crate::paginate::Paginator;
use crate::query::build_query;
use crate::source::LogSource;

/// Everything needed to run one retrieval
#[derive(Clone, Debug)]
pub struct RetrievalPlan {
    pub query: QuerySpec,
    pub window: TimeWindow,
    pub limit: usize,
    pub batch_size: usize,
    pub context: ContextRequest,
}

impl RetrievalPlan {
    pub fn validate(&self) -> Result<()> {
        validate_request(self.limit, self.query.regex.as_deref(), self.context)
    }
}

/// Reject requests the service should never see
pub fn validate_request(limit: usize, regex: Option<&str>, context: ContextRequest) -> Result<()> {
    let reject = |message: &str| -> Result<()> {
        error!("{}", message);
        Err(LokiError::Validation(message.to_string()))
    };

    if limit > MAX_LIMIT {
        return reject("Limit cannot be greater than 500000.");
    }
    if context.is_enabled() {
        if regex.is_none_or(str::is_empty) {
            return reject("Context can only be used for a query.");
        }
        if context.span() > MAX_CONTEXT {
            return reject("Context cannot be greater than 250.");
        }
    }
    Ok(())
}

/// What a session produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetrievalSummary {
    pub batches: usize,
    pub entries: usize,
    pub groups: usize,
}

/// Run a retrieval, streaming output batch by batch.
///
/// Any error aborts the session; lines already written stay written and a
/// partially built context group is dropped.
pub async fn retrieve<S, W>(
    source: &S,
    plan: &RetrievalPlan,
    presenter: &mut Presenter<W>,
) -> Result<RetrievalSummary>
where
    S: LogSource,
    W: Write,
{
    plan.validate()?;

    let mut pages = Paginator::new(
        build_query(&plan.query),
        plan.window,
        plan.limit,
        plan.batch_size,
    );
    let mut summary = RetrievalSummary::default();

    if !plan.context.is_enabled() {
        while let Some(batch) = pages.next_batch(source).await? {
            summary.batches += 1;
            summary.entries += batch.len();
            presenter.print(&batch)?;
        }
        info!(?summary, "retrieval finished");
        return Ok(summary);
    }

    let fetcher = ContextFetcher::new(source, &plan.query);
    let mut pending = PendingGroup::Empty;

    while let Some(batch) = pages.next_batch(source).await? {
        summary.batches += 1;
        summary.entries += batch.len();

        for anchor in &batch {
            let slice = fetcher.slice(anchor, plan.context).await?;
            let (next, flushed) = pending.absorb(slice);
            pending = next;

            if let Some(group) = flushed {
                presenter.print(&group)?;
                presenter.separator()?;
                summary.groups += 1;
            }
        }
    }

    let group = pending.flush();
    if !group.is_empty() {
        presenter.print(&group)?;
        summary.groups += 1;
    }

    info!(?summary, "retrieval finished");
    Ok(summary)
}
