//! Generic ordered validation pipelines.
//!
//! A [`Checker`] runs a fixed sequence of [`Stage`]s over a mutable context.
//! Stages either continue, stop the pipeline cleanly (a typed signal, not an
//! error: a duplicate ballot, an unknown sender), or fail with a protocol
//! error that aborts the remaining stages.

use concord_types::Error;
use tracing::debug;

/// What a stage decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Proceed to the next stage.
    Continue,
    /// Clean early termination with a reason. Not a fault.
    Stop(String),
}

pub type StageResult = Result<StageOutcome, Error>;

/// One named validation/side-effect step.
pub struct Stage<C> {
    pub name: &'static str,
    pub func: fn(&mut C) -> StageResult,
}

/// Hook invoked before every stage attempt, so observers see each one even
/// when the stage stops or fails. Receives the stage index, its name and the
/// context.
pub type DeferFn<'f, C> = dyn FnMut(usize, &'static str, &C) + 'f;

/// Result of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage ran.
    Completed,
    /// A stage stopped the pipeline cleanly.
    Stopped {
        stage: &'static str,
        reason: String,
    },
}

impl RunOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunOutcome::Stopped { .. })
    }
}

/// An ordered validation pipeline over a context type.
pub struct Checker<C> {
    name: &'static str,
    stages: Vec<Stage<C>>,
}

impl<C> Checker<C> {
    pub fn new(name: &'static str, stages: Vec<Stage<C>>) -> Self {
        Checker { name, stages }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run every stage in order.
    pub fn run(&self, ctx: &mut C) -> Result<RunOutcome, Error> {
        self.run_with_defer(ctx, &mut |_, _, _| {})
    }

    /// Run every stage in order, invoking `defer` before each attempt.
    ///
    /// A [`StageOutcome::Stop`] breaks the pipeline and is reported as a
    /// clean outcome (logged at debug). Any error is returned immediately
    /// without running later stages.
    pub fn run_with_defer(
        &self,
        ctx: &mut C,
        defer: &mut DeferFn<'_, C>,
    ) -> Result<RunOutcome, Error> {
        for (index, stage) in self.stages.iter().enumerate() {
            defer(index, stage.name, ctx);
            match (stage.func)(ctx)? {
                StageOutcome::Continue => {}
                StageOutcome::Stop(reason) => {
                    debug!(
                        checker = self.name,
                        stage = stage.name,
                        %reason,
                        "pipeline stopped",
                    );
                    return Ok(RunOutcome::Stopped {
                        stage: stage.name,
                        reason,
                    });
                }
            }
        }
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        visited: Vec<&'static str>,
    }

    fn first(ctx: &mut Ctx) -> StageResult {
        ctx.visited.push("first");
        Ok(StageOutcome::Continue)
    }

    fn stopper(ctx: &mut Ctx) -> StageResult {
        ctx.visited.push("stopper");
        Ok(StageOutcome::Stop("done early".to_string()))
    }

    fn failer(ctx: &mut Ctx) -> StageResult {
        ctx.visited.push("failer");
        Err(Error::InvalidMessage)
    }

    fn last(ctx: &mut Ctx) -> StageResult {
        ctx.visited.push("last");
        Ok(StageOutcome::Continue)
    }

    #[test]
    fn runs_all_stages_in_order() {
        let checker = Checker::new(
            "test",
            vec![
                Stage { name: "first", func: first },
                Stage { name: "last", func: last },
            ],
        );
        let mut ctx = Ctx::default();
        let outcome = checker.run(&mut ctx).unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(ctx.visited, vec!["first", "last"]);
    }

    #[test]
    fn stop_skips_later_stages() {
        let checker = Checker::new(
            "test",
            vec![
                Stage { name: "first", func: first },
                Stage { name: "stopper", func: stopper },
                Stage { name: "last", func: last },
            ],
        );
        let mut ctx = Ctx::default();
        let outcome = checker.run(&mut ctx).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Stopped {
                stage: "stopper",
                reason: "done early".to_string()
            }
        );
        assert_eq!(ctx.visited, vec!["first", "stopper"]);
    }

    #[test]
    fn error_aborts_later_stages() {
        let checker = Checker::new(
            "test",
            vec![
                Stage { name: "failer", func: failer },
                Stage { name: "last", func: last },
            ],
        );
        let mut ctx = Ctx::default();
        assert_eq!(checker.run(&mut ctx).unwrap_err(), Error::InvalidMessage);
        assert_eq!(ctx.visited, vec!["failer"]);
    }

    #[test]
    fn defer_fires_before_every_attempt() {
        let checker = Checker::new(
            "test",
            vec![
                Stage { name: "first", func: first },
                Stage { name: "stopper", func: stopper },
                Stage { name: "last", func: last },
            ],
        );
        let mut ctx = Ctx::default();
        let mut seen = Vec::new();
        let _ = checker
            .run_with_defer(&mut ctx, &mut |index, name, ctx| {
                // the hook runs before the stage executes
                assert_eq!(ctx.visited.len(), index);
                seen.push(name);
            })
            .unwrap();
        // the stopped stage was still announced; the skipped one was not
        assert_eq!(seen, vec!["first", "stopper"]);
    }
}
