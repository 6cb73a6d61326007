use crate::infra::{noon_utc, parse_date, parse_role, LoggingTransport};
use chrono::{Local, NaiveDate};
use clap::Args;
use shift_cover::auth::TokenVerifier;
use shift_cover::config::AppConfig;
use shift_cover::error::AppError;
use shift_cover::workflows::coverage::{
    Actor, BroadcastHub, Candidate, CoverageConfig, CoverageRepository, CoverageService,
    InMemoryCoverageStore, LocationId, NotifyOutcome, NotifyQueue, OrganizationId,
    RankingConfig, RankingEngine, ShiftId, SickCallRequest, StaffId, UserRole,
};
use shift_cover::workflows::roster::RosterImporter;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_ORGANIZATION: &str = "org-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date of the vacated shift (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Print every event published during the walkthrough.
    #[arg(long)]
    pub(crate) show_events: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    /// Staff CSV export
    #[arg(long)]
    pub(crate) roster: PathBuf,
    /// Shift CSV export
    #[arg(long)]
    pub(crate) schedule: PathBuf,
    /// Shift to find a replacement for
    #[arg(long)]
    pub(crate) shift: String,
    /// Organization that owns the shift
    #[arg(long)]
    pub(crate) organization: String,
    /// Ranking date for the fairness window (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// List staff already working that date instead of dropping them
    #[arg(long)]
    pub(crate) include_conflicts: bool,
}

#[derive(Args, Debug)]
pub(crate) struct TokenArgs {
    /// Staff id to put in the `sub` claim
    #[arg(long)]
    pub(crate) staff: String,
    /// Organization id to put in the `org` claim
    #[arg(long)]
    pub(crate) organization: String,
    /// staff, manager, or admin
    #[arg(long, value_parser = parse_role, default_value = "staff")]
    pub(crate) role: UserRole,
    /// Token lifetime in minutes
    #[arg(long, default_value_t = 60)]
    pub(crate) minutes: i64,
}

pub(crate) fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let RankArgs {
        roster,
        schedule,
        shift,
        organization,
        as_of,
        include_conflicts,
    } = args;

    let store = Arc::new(InMemoryCoverageStore::new());
    let summary = RosterImporter::from_paths(store.as_ref(), roster, Some(schedule))?;
    println!(
        "Loaded {} staff and {} shifts across {} organizations",
        summary.staff, summary.shifts, summary.organizations
    );

    let config = RankingConfig {
        exclude_conflicting_staff: !include_conflicts,
        ..RankingConfig::default()
    };
    let engine = RankingEngine::new(store, config);
    let as_of = noon_utc(as_of.unwrap_or_else(|| Local::now().date_naive()));
    let candidates = engine.rank_at(
        &ShiftId::new(shift.clone()),
        &OrganizationId::new(organization),
        as_of,
    )?;

    println!("\nReplacement candidates for {shift}");
    render_candidates(&candidates);
    Ok(())
}

pub(crate) fn run_token(args: TokenArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let verifier = TokenVerifier::new(&config.auth.jwt_secret);
    let actor = Actor {
        id: StaffId::new(args.staff),
        organization_id: OrganizationId::new(args.organization),
        role: args.role,
    };
    let token = verifier.issue(&actor, chrono::Duration::minutes(args.minutes))?;
    println!("{token}");
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());

    println!("Shift coverage demo");
    let store = Arc::new(InMemoryCoverageStore::new());
    let mut importer = RosterImporter::new(store.as_ref());
    importer
        .staff(demo_staff_csv().as_bytes())?
        .shifts(demo_shift_csv(date).as_bytes())?;
    let summary = importer.finish();
    println!(
        "- Roster: {} staff, {} shifts at {} location(s)",
        summary.staff, summary.shifts, summary.locations
    );

    let organization = OrganizationId::new(DEMO_ORGANIZATION);
    let hub = Arc::new(BroadcastHub::new(64));
    let mut events = hub.subscribe(&organization);
    let transport = Arc::new(LoggingTransport::default());
    let service = CoverageService::new(
        store.clone(),
        transport.clone(),
        hub,
        NotifyQueue::detached(),
        CoverageConfig::default(),
    );

    let reporter = Actor {
        id: StaffId::new("s-jordan"),
        organization_id: organization.clone(),
        role: UserRole::Staff,
    };
    let sick_call = match service.submit(
        &reporter,
        SickCallRequest {
            shift_id: ShiftId::new("sh-morning"),
            location_id: LocationId::new("loc-maple"),
            reason: Some("fever".to_string()),
        },
    ) {
        Ok(sick_call) => sick_call,
        Err(err) => {
            println!("  Sick call rejected: {err}");
            return Ok(());
        }
    };
    println!(
        "\n{} called in sick for the {date} morning shift -> sick call {}",
        reporter.id, sick_call.id
    );

    match service.candidates(&sick_call.id, &organization) {
        Ok(candidates) => {
            println!("\nRanked replacements");
            render_candidates(&candidates);
        }
        Err(err) => println!("  Ranking unavailable: {err}"),
    }

    println!("\nOutreach");
    let first = match service.notify_next(&sick_call.id, &organization) {
        Ok(outcome) => {
            describe_outcome(&outcome);
            offered_to(&outcome)
        }
        Err(err) => {
            println!("  Notify failed: {err}");
            return Ok(());
        }
    };
    let Some(first) = first else {
        return Ok(());
    };
    match service.respond(&sick_call.id, &first, "NO") {
        Ok(reply) => println!("- {first} replied NO ({:?})", reply.response.response_type),
        Err(err) => println!("- Reply from {first} not recorded: {err}"),
    }

    let second = match service.notify_next(&sick_call.id, &organization) {
        Ok(outcome) => {
            describe_outcome(&outcome);
            offered_to(&outcome)
        }
        Err(err) => {
            println!("  Notify failed: {err}");
            return Ok(());
        }
    };
    if let Some(second) = second {
        let phone = store
            .staff_member(&second)
            .ok()
            .flatten()
            .and_then(|member| member.phone);
        let reply = match phone {
            Some(phone) => service.respond_by_phone(&phone, "YES"),
            None => service.respond(&sick_call.id, &second, "YES"),
        };
        match reply {
            Ok(reply) => println!(
                "- {second} replied YES -> sick call {}",
                reply.sick_call.status.label()
            ),
            Err(err) => println!("- Reply from {second} not recorded: {err}"),
        }
    }

    match service.audit_trail(&sick_call.id, &organization) {
        Ok(entries) => {
            println!("\nAudit trail");
            for entry in entries {
                let actor = entry
                    .actor_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "system".to_string());
                println!("- {} by {}", entry.action.label(), actor);
            }
        }
        Err(err) => println!("  Audit trail unavailable: {err}"),
    }

    println!("\nMessages sent: {}", transport.sent());
    if args.show_events {
        println!("\nPublished events");
        while let Ok(published) = events.try_recv() {
            println!("- {}", published.event.name());
        }
    }

    Ok(())
}

fn offered_to(outcome: &NotifyOutcome) -> Option<StaffId> {
    match outcome {
        NotifyOutcome::Offered { offered_to, .. } => Some(offered_to.clone()),
        NotifyOutcome::Exhausted { .. } | NotifyOutcome::Unfilled { .. } => None,
    }
}

fn describe_outcome(outcome: &NotifyOutcome) {
    match outcome {
        NotifyOutcome::Offered {
            offered_to,
            notification_id,
            candidates,
            ..
        } => {
            let delivery = if notification_id.is_some() {
                "delivered"
            } else {
                "delivery failed"
            };
            println!(
                "- Offered to {offered_to} ({delivery}); {} candidate(s) in the set",
                candidates.len()
            );
        }
        NotifyOutcome::Exhausted { candidates, .. } => {
            println!(
                "- All {} candidate(s) already hold an offer; escalate to a manager",
                candidates.len()
            );
        }
        NotifyOutcome::Unfilled { .. } => println!("- Nobody available; shift marked unfilled"),
    }
}

fn render_candidates(candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!("- none");
        return;
    }
    for candidate in candidates {
        let mut flags = Vec::new();
        if !candidate.is_available {
            flags.push("already working");
        }
        if candidate.would_overtime {
            flags.push("overtime");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "{:>3}. {} ({}) score {} | {:.1}h this week{}",
            candidate.rank,
            candidate.staff.name,
            candidate.staff.id,
            candidate.score,
            candidate.hours_this_week,
            flags
        );
        for reason in &candidate.reasons {
            println!("       - {reason}");
        }
    }
}

fn demo_staff_csv() -> String {
    format!(
        "id,organization_id,name,role,phone,email,seniority\n\
s-jordan,{org},Jordan Pike,staff,5155550100,,4\n\
s-ada,{org},Ada Byrne,staff,5155550101,,6\n\
s-bo,{org},Bo Lind,staff,5155550102,,2\n\
s-cy,{org},Cy Marsh,staff,,cy@example.org,8\n\
m-mo,{org},Mo Reyes,manager,5155550199,,10\n",
        org = DEMO_ORGANIZATION
    )
}

fn demo_shift_csv(date: NaiveDate) -> String {
    let next = date + chrono::Duration::days(1);
    format!(
        "id,organization_id,location_id,location_name,assigned_to,date,start,end\n\
sh-morning,{org},loc-maple,Maple House,s-jordan,{date},07:00,15:00\n\
sh-evening,{org},loc-maple,Maple House,s-cy,{date},15:00,23:00\n\
sh-night,{org},loc-maple,Maple House,s-bo,{next},23:00,07:00\n",
        org = DEMO_ORGANIZATION
    )
}
