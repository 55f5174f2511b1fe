//! Lookup Pipeline
//!
//! One worker drives the browser through the leads in order. It reports
//! back over a channel (log lines, progress, each finished lead, the final
//! list or a setup failure) and checks a stop flag before every lead.
//! A lead in flight always runs to completion; stopping skips the rest,
//! which keep their `New` status.

use crate::config::Settings;
use crate::scrapers::{PageFindings, PropertyLookup};
use crate::triage::apply_outcome;
use crate::types::{Lead, LookupOutcome};
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Notifications from the worker to whoever drives it
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Log(String),
    Progress { current: usize, total: usize },
    Lead(Lead),
    Finished(Vec<Lead>),
    /// The run could not start; no lead was looked up
    Error(String),
}

/// Cooperative cancellation, checked once per lead
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn emit(events: &UnboundedSender<PipelineEvent>, event: PipelineEvent) {
    // Receiver gone means nobody is listening; the run still finishes
    let _ = events.send(event);
}

fn emit_log(events: &UnboundedSender<PipelineEvent>, message: String) {
    info!("{}", message);
    emit(events, PipelineEvent::Log(message));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Look up one property code within `budget`. Never fails: every way the
/// lookup can end is turned into a `LookupOutcome`.
pub async fn process_lead<L>(lookup: &mut L, property_id: &str, budget: Duration) -> LookupOutcome
where
    L: PropertyLookup + ?Sized,
{
    let attempt = AssertUnwindSafe(lookup.lookup(property_id)).catch_unwind();

    match tokio::time::timeout(budget, attempt).await {
        Err(_) => {
            warn!("{}: lookup exceeded {}s", property_id, budget.as_secs());
            LookupOutcome::Timeout {
                reason: format!("Timeout após {}s", budget.as_secs()),
            }
        }
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            error!("{}: lookup panicked: {}", property_id, message);
            LookupOutcome::Critical { error: message }
        }
        Ok(Ok(Err(e))) => {
            error!("{}: lookup failed: {:?}", property_id, e);
            LookupOutcome::Failed {
                error: format!("{:#}", e),
            }
        }
        Ok(Ok(Ok(page))) => match page.findings {
            PageFindings::NotAvailable => LookupOutcome::NotAvailable { url: page.url },
            PageFindings::Available { city } => LookupOutcome::Found {
                url: page.url,
                city: city.map(|found| found.city),
            },
        },
    }
}

/// Look up every lead in order and classify it.
///
/// Returns all leads, processed or not. The lookup is quit before
/// returning, whether the run finished or was stopped.
pub async fn run_pipeline<L>(
    lookup: &mut L,
    mut leads: Vec<Lead>,
    settings: &Settings,
    stop: &StopHandle,
    events: &UnboundedSender<PipelineEvent>,
) -> Vec<Lead>
where
    L: PropertyLookup + ?Sized,
{
    let total = leads.len();
    let budget = settings.processing.lookup_timeout();
    let pause = settings.processing.inter_lead_pause();

    emit_log(events, format!("Processando {} leads", total));

    for index in 0..total {
        if stop.is_stopped() {
            emit_log(events, format!("Processamento interrompido: {} leads não processados", total - index));
            break;
        }
        if index > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        emit(events, PipelineEvent::Progress { current: index + 1, total });
        let lead = &mut leads[index];
        emit_log(events, format!("[{}/{}] {} ({})", index + 1, total, lead.name, lead.property_id));

        let outcome = process_lead(&mut *lookup, &lead.property_id, budget).await;
        apply_outcome(lead, outcome, &settings.site);

        emit_log(events, format!("{}: {}", lead.name, lead.status.label()));
        emit(events, PipelineEvent::Lead(lead.clone()));
    }

    if let Err(e) = lookup.quit().await {
        warn!("Failed to quit browser: {:#}", e);
    }

    emit(events, PipelineEvent::Finished(leads.clone()));
    leads
}

/// Handle to a pipeline running on its own task
pub struct PipelineHandle {
    pub events: UnboundedReceiver<PipelineEvent>,
    pub stop: StopHandle,
    pub task: JoinHandle<Vec<Lead>>,
}

/// Start the lookup on a background task.
///
/// `connect` opens the browser session. If it fails the run ends with a
/// single `PipelineEvent::Error` and the leads come back untouched.
pub fn spawn_pipeline<L, F>(connect: F, leads: Vec<Lead>, settings: Settings) -> PipelineHandle
where
    L: PropertyLookup + 'static,
    F: Future<Output = Result<L>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let stop = StopHandle::new();
    let worker_stop = stop.clone();

    let task = tokio::spawn(async move {
        let mut lookup = match connect.await {
            Ok(lookup) => lookup,
            Err(e) => {
                error!("Failed to start browser session: {:?}", e);
                emit(&tx, PipelineEvent::Error(format!("Erro ao iniciar o navegador: {:#}", e)));
                return leads;
            }
        };
        run_pipeline(&mut lookup, leads, &settings, &worker_stop, &tx).await
    });

    PipelineHandle { events: rx, stop, task }
}
