//! The stage table

use crate::pipeline::StageContext;
use crate::records::StageStats;
use crate::{batch, clean, crawler, dedupe, extract, loader, probe, refresh, template, Result};
use async_trait::async_trait;

/// One pipeline stage, invoked as a function call
#[async_trait(?Send)]
pub trait Stage {
    fn name(&self) -> &'static str;

    /// A required stage's failure halts the run
    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats>;
}

/// A stage backed by a synchronous function
pub struct SyncStage {
    name: &'static str,
    required: bool,
    run: fn(&StageContext) -> Result<StageStats>,
}

#[async_trait(?Send)]
impl Stage for SyncStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats> {
        (self.run)(ctx)
    }
}

pub struct CrawlStage;

#[async_trait(?Send)]
impl Stage for CrawlStage {
    fn name(&self) -> &'static str {
        "crawl"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats> {
        crawler::run(ctx).await
    }
}

pub struct ProbeStage;

#[async_trait(?Send)]
impl Stage for ProbeStage {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats> {
        probe::run(ctx).await
    }
}

pub struct FetchStage;

#[async_trait(?Send)]
impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats> {
        batch::run(ctx).await
    }
}

pub struct RefreshStage;

#[async_trait(?Send)]
impl Stage for RefreshStage {
    fn name(&self) -> &'static str {
        "refresh"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageStats> {
        refresh::run(ctx).await
    }
}

static CRAWL: CrawlStage = CrawlStage;
static PROBE: ProbeStage = ProbeStage;
static FETCH: FetchStage = FetchStage;
static REFRESH: RefreshStage = RefreshStage;

static GROUP: SyncStage = SyncStage {
    name: "group",
    required: true,
    run: template::run,
};
static EXTRACT: SyncStage = SyncStage {
    name: "extract",
    required: true,
    run: extract::run,
};
static DEDUPE: SyncStage = SyncStage {
    name: "dedupe",
    required: true,
    run: dedupe::run,
};
static CLEAN: SyncStage = SyncStage {
    name: "clean",
    required: true,
    run: clean::run,
};
static LOAD: SyncStage = SyncStage {
    name: "load",
    required: false,
    run: loader::run,
};

/// The forward pipeline, in execution order
pub fn pipeline_stages() -> [&'static dyn Stage; 8] {
    [&CRAWL, &GROUP, &PROBE, &FETCH, &EXTRACT, &DEDUPE, &CLEAN, &LOAD]
}

/// Looks up any stage, including the refresher, by name
pub fn stage_by_name(name: &str) -> Option<&'static dyn Stage> {
    if name == REFRESH.name() {
        return Some(&REFRESH);
    }
    pipeline_stages().into_iter().find(|s| s.name() == name)
}
