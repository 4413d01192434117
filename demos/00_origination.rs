/// origination - approve a credit, print its schedule, hit the exposure cap
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use credit_engine_rs::{
    telemetry, BankError, Context, CreditEngine, EngineConfig, InMemoryLedger, Money,
    SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(None)?;
    telemetry::init_from_config(&config.telemetry)?;

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
    ));

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = CreditEngine::new(ledger.clone(), ledger.clone(), config.policy.clone());

    let user_id = 1001;
    let account = ledger.open_account(user_id, Money::from_major(5_000), "RUB", time.now())?;
    println!("account {} opened with {}", account.number, account.balance);

    // 100,000 over 12 months at the policy rate
    let ctx = Context::new(&time);
    let credit = engine.originate(&ctx, user_id, account.id, Money::from_major(100_000), 12)?;
    println!(
        "credit {} approved: {} at {} for {} months, {} a month",
        credit.id, credit.amount, credit.annual_rate, credit.term, credit.monthly_payment
    );

    println!(
        "\n{:>3}  {:<10}  {:>10}  {:>10}  {:>10}",
        "#", "due", "amount", "principal", "interest"
    );
    for installment in engine.schedule(credit.id)? {
        println!(
            "{:>3}  {:<10}  {:>10}  {:>10}  {:>10}",
            installment.number,
            installment.due_date,
            installment.amount,
            installment.principal_portion,
            installment.interest_portion
        );
    }

    // a second, large request runs into the exposure cap
    match engine.originate(&ctx, user_id, account.id, Money::from_major(900_000), 36) {
        Err(BankError::ExposureLimitExceeded { active, requested, cap }) => {
            println!("\nrejected: active {active} + requested {requested} reaches cap {cap}");
        }
        other => println!("\nunexpected outcome: {other:?}"),
    }

    println!("\n{}", engine.credit_view(credit.id)?.to_json_pretty()?);
    println!("events: {:#?}", engine.take_events());

    Ok(())
}
