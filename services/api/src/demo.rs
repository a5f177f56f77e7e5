use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use mpesewa::error::AppError;
use mpesewa::lending::calculator::{daily_schedule, quote, quote_warnings};
use mpesewa::lending::money::format_amount;
use mpesewa::lending::{
    BillingPeriod, BorrowerRegistration, CategoryId, CountryCode, FixedClock,
    GroupDraft, GroupId, Guarantor, InMemoryLendingRepository, LenderRegistration, LendingService,
    LoanId, LoanRequest, RateCard, ReferenceData, RepaymentInput, RepaymentMethod, TierRegistry,
    User,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// Principal to borrow
    #[arg(long)]
    pub(crate) amount: f64,
    /// Repayment period in days
    #[arg(long, default_value_t = 7)]
    pub(crate) days: u32,
    /// Country whose currency and loan bounds apply
    #[arg(long, default_value = "KE")]
    pub(crate) country: String,
    /// Lender tier to check the per-loan limit against
    #[arg(long)]
    pub(crate) tier: Option<String>,
    /// Print the amount owed for each day of the period
    #[arg(long)]
    pub(crate) schedule: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walkthrough starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Stop after the repaid loan and skip the default and blacklist portion.
    #[arg(long)]
    pub(crate) skip_default: bool,
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    for line in quote_lines(&args, &ReferenceData::standard(), &RateCard::default())? {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    for line in walkthrough(today, !args.skip_default)? {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn quote_lines(
    args: &QuoteArgs,
    reference: &ReferenceData,
    rates: &RateCard,
) -> Result<Vec<String>, AppError> {
    let country = reference.country(&CountryCode::new(&args.country))?;
    let quote = quote(args.amount, args.days, rates);
    let tier_limit = args
        .tier
        .as_deref()
        .map(|tier| TierRegistry::standard().lookup(tier).per_loan_limit);

    let mut lines = vec![format!(
        "Quote for {} over {} days ({})",
        country.format(args.amount),
        args.days,
        country.name
    )];
    for line in &quote.breakdown {
        lines.push(format!("  {:<44} {:>14}", line.label, country.format(line.value)));
    }
    if !country.accepts(args.amount) {
        lines.push(format!(
            "  ! {} accepts loans between {} and {}",
            country.name,
            country.format(country.min_loan),
            country.format(country.max_loan)
        ));
    }
    for warning in quote_warnings(&quote, tier_limit) {
        lines.push(format!("  ! {}", warning.message()));
    }

    if args.schedule {
        lines.push("  Day  Amount due".to_string());
        for day in daily_schedule(args.amount, args.days, rates) {
            let marker = if day.penalty_applies { " (penalty)" } else { "" };
            lines.push(format!(
                "  {:>3}  {}{}",
                day.day,
                format_amount(day.amount_due),
                marker
            ));
        }
    }

    Ok(lines)
}

type DemoService = LendingService<InMemoryLendingRepository, FixedClock>;

/// Five Nairobi borrowers found a group, a premium lender funds two loans,
/// one is repaid in instalments and the other defaults into the blacklist.
pub(crate) fn walkthrough(today: NaiveDate, include_default: bool) -> Result<Vec<String>, AppError> {
    let clock = Arc::new(FixedClock::new(
        Utc.from_utc_datetime(&today.and_time(NaiveTime::MIN)),
    ));
    let service: DemoService = LendingService::new(
        Arc::new(InMemoryLendingRepository::new()),
        clock.clone(),
        ReferenceData::standard(),
    );
    let kenya = service.reference().country(&CountryCode::new("KE"))?.clone();
    let mut lines = Vec::new();

    let borrowers = ["Wanjiru", "Achieng", "Mwangi", "Njeri", "Kiptoo"]
        .iter()
        .map(|name| register_borrower(&service, name))
        .collect::<Result<Vec<_>, _>>()?;
    let members: Vec<_> = borrowers[1..].iter().map(|user| user.id.clone()).collect();
    let group = service.create_group(
        &borrowers[0].id,
        GroupDraft {
            name: "Gikomba Traders".to_string(),
            ..GroupDraft::default()
        },
        &members,
    )?;
    lines.push(format!(
        "Group {} '{}' founded with {} members (invite code {})",
        group.id,
        group.name,
        group.members.len(),
        group.invite_code.as_deref().unwrap_or("-")
    ));

    let lender = service.register_lender(LenderRegistration {
        name: "Kamau Savings".to_string(),
        phone: "+254722000100".to_string(),
        country: kenya.code.clone(),
        tier: "premium".to_string(),
        period: BillingPeriod::Monthly,
    })?;
    let subscription = service.confirm_subscription_payment(&lender.id, "MPESA-SUB-0001")?;
    service.join_group(&group.id, &lender.id, None)?;
    lines.push(format!(
        "Lender {} subscribed to {} until {} and joined the group",
        lender.id,
        subscription.tier.label(),
        subscription.expiry_date
    ));

    let fare = request_and_fund(&service, &borrowers[0], &group.id, "fare", 1_000.0, &lender)?;
    let view = service.loan_view(&fare)?;
    lines.push(format!(
        "Loan {} funded: {} due by {}",
        fare,
        kenya.format(view.total_due),
        view.due_date
            .map(|due| due.date_naive().to_string())
            .unwrap_or_else(|| "-".to_string())
    ));

    clock.advance_days(3);
    for (amount, reference) in [(600.0, "QK71AB20"), (500.0, "QK71AB21")] {
        let receipt = service.record_repayment(
            &fare,
            RepaymentInput {
                amount,
                method: RepaymentMethod::Mpesa,
                reference: reference.to_string(),
                date: service.now(),
                recorded_by: borrowers[0].id.clone(),
            },
        )?;
        lines.push(format!(
            "  repayment {} of {}: {} remaining, loan {}",
            reference,
            kenya.format(amount),
            kenya.format(receipt.remaining_balance),
            receipt.status.label()
        ));
    }

    if include_default {
        let food = request_and_fund(&service, &borrowers[1], &group.id, "food", 1_000.0, &lender)?;
        clock.advance_days(68);
        let view = service.loan_view(&food)?;
        lines.push(format!(
            "Loan {} is {} by {} days, owing {}",
            food,
            view.standing.label(),
            view.overdue_days,
            kenya.format(view.balance)
        ));
        for entry in service.flag_defaults()? {
            lines.push(format!(
                "  blacklisted {} for {} (defaulted {})",
                entry.borrower_id,
                kenya.format(entry.amount_defaulted),
                entry.default_date
            ));
        }
    }

    let stats = service.group_statistics(&group.id)?;
    lines.push(format!(
        "Group totals: {} loans, {} lent, repayment rate {}%",
        stats.total_loans,
        kenya.format(stats.total_amount),
        stats.repayment_rate
    ));

    Ok(lines)
}

fn register_borrower(service: &DemoService, name: &str) -> Result<User, AppError> {
    let user = service.register_borrower(BorrowerRegistration {
        name: name.to_string(),
        phone: "+254700000000".to_string(),
        country: CountryCode::new("KE"),
        guarantors: vec![
            Guarantor {
                name: format!("{name}'s sister"),
                phone: "+254711000001".to_string(),
                relationship: "sibling".to_string(),
            },
            Guarantor {
                name: format!("{name}'s employer"),
                phone: "+254711000002".to_string(),
                relationship: "employer".to_string(),
            },
        ],
    })?;
    Ok(user)
}

fn request_and_fund(
    service: &DemoService,
    borrower: &User,
    group_id: &GroupId,
    category: &str,
    amount: f64,
    lender: &User,
) -> Result<LoanId, AppError> {
    let loan = service.request_loan(LoanRequest {
        borrower_id: borrower.id.clone(),
        category: CategoryId::new(category),
        group_id: group_id.clone(),
        amount,
        repayment_days: 7,
        purpose: format!("{category} for the week"),
    })?;
    service.fund_loan(&loan.id, &lender.id)?;
    Ok(loan.id)
}
