//! `seatgate load <item>` – concurrent admission run with an oversell check.

use anyhow::{bail, Result};
use seatgate_core::types::Outcome;
use seatgate_core::{AdmissionController, AdmissionError};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub item: i64,
    pub requests: u32,
    pub limit: u32,
    pub first_requester: i64,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub tally: HashMap<Outcome, u32>,
    pub notifications: usize,
    pub elapsed_secs: f64,
}

impl LoadReport {
    pub fn count(&self, outcome: Outcome) -> u32 {
        self.tally.get(&outcome).copied().unwrap_or(0)
    }
}

/// Publish every request up front so they contend, then collect the outcomes.
pub async fn simulate(controller: &AdmissionController, opts: &LoadOptions) -> Result<LoadReport> {
    match controller.availability(opts.item).await {
        Ok(_) => {}
        Err(AdmissionError::UnknownItem(_)) => controller.define_item(opts.item, opts.limit).await?,
        Err(e) => return Err(e.into()),
    }

    let requesters: Vec<i64> = (0..i64::from(opts.requests))
        .map(|i| opts.first_requester + i)
        .collect();
    let groups: BTreeSet<String> = requesters
        .iter()
        .map(|&r| controller.notification_group(opts.item, r))
        .collect();
    let mut subscriptions: Vec<_> = groups.into_iter().map(|g| controller.subscribe(g)).collect();

    let started = Instant::now();
    let mut tickets = Vec::with_capacity(requesters.len());
    let mut report = LoadReport::default();
    for &r in &requesters {
        match controller.publish_admission(opts.item, r) {
            Ok(t) => tickets.push(t),
            Err(e) => {
                tracing::warn!(requester_id = r, "request rejected: {e}");
                *report.tally.entry(Outcome::Failed).or_default() += 1;
            }
        }
    }
    for t in tickets {
        let outcome = match t.outcome().await {
            Ok(a) => a.outcome(),
            Err(e) => {
                tracing::warn!("request failed: {e}");
                Outcome::Failed
            }
        };
        *report.tally.entry(outcome).or_default() += 1;
    }
    report.elapsed_secs = started.elapsed().as_secs_f64();

    for sub in &mut subscriptions {
        while sub.try_recv().is_some() {
            report.notifications += 1;
        }
    }
    Ok(report)
}

pub async fn run_load(controller: &AdmissionController, opts: &LoadOptions) -> Result<()> {
    let report = simulate(controller, opts).await?;
    let a = controller.availability(opts.item).await?;

    println!(
        "{} requests against item {} ({:?} strategy) in {:.3}s",
        opts.requests,
        opts.item,
        controller.strategy(),
        report.elapsed_secs
    );
    println!("  admitted:      {}", report.count(Outcome::Admitted));
    println!("  waitlisted:    {}", report.count(Outcome::Waitlisted));
    println!("  failed:        {}", report.count(Outcome::Failed));
    println!("  notifications: {}", report.notifications);
    println!("  confirmed:     {}/{}", a.confirmed_count, a.limit);

    if a.confirmed_count > a.limit {
        bail!(
            "oversold item {}: {} confirmed for a limit of {}",
            opts.item,
            a.confirmed_count,
            a.limit
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatgate_core::config::{SeatgateConfig, Strategy};
    use seatgate_core::store::SqliteStore;
    use seatgate_core::ReservationService;

    async fn run(strategy: Strategy) -> LoadReport {
        let mut cfg = SeatgateConfig::default();
        cfg.strategy = strategy;
        cfg.lock.retry.max_attempts = 10_000;
        cfg.lock.retry.base_delay_ms = 1;
        cfg.lock.retry.max_delay_ms = 5;
        let store = SqliteStore::open_in_memory().await.unwrap();
        let service = ReservationService::start(&cfg, store).await.unwrap();
        let opts = LoadOptions {
            item: 1,
            requests: 30,
            limit: 7,
            first_requester: 100,
        };
        let report = simulate(service.controller(), &opts).await.unwrap();
        service.shutdown().await;
        report
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn load_admits_exactly_the_limit() {
        for strategy in [Strategy::Queue, Strategy::Lock] {
            let report = run(strategy).await;
            assert_eq!(report.count(Outcome::Admitted), 7, "{strategy:?}");
            assert_eq!(report.count(Outcome::Waitlisted), 23);
            assert_eq!(report.count(Outcome::Failed), 0);
            // Per-requester addressing: one notification per request.
            assert_eq!(report.notifications, 30);
        }
    }
}
