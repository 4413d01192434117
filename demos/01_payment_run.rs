/// payment run - advance time month by month and collect due installments
use std::sync::Arc;

use chrono::{Months, TimeZone, Utc};
use credit_engine_rs::{
    AccountService, Context, CreditEngine, CreditPolicy, InMemoryLedger, Money, SafeTimeProvider,
    TimeSource, TransferService,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    credit_engine_rs::telemetry::init_tracing("info")?;

    let start = Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap();
    let time = SafeTimeProvider::new(TimeSource::Test(start));
    let controller = time.test_control().unwrap();

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = CreditEngine::new(ledger.clone(), ledger.clone(), CreditPolicy::default());
    let accounts = AccountService::new(ledger.clone(), engine.account_locks());
    let transfers = TransferService::new(ledger.clone(), ledger.clone(), engine.account_locks());

    let borrower = ledger.open_account(7, Money::ZERO, "RUB", time.now())?;
    let savings = ledger.open_account(7, Money::ZERO, "RUB", time.now())?;

    let credit =
        engine.originate(&Context::new(&time), 7, borrower.id, Money::from_major(10_000), 6)?;
    println!("credit {} disbursed, {} a month", credit.id, credit.monthly_payment);

    // park most of the money where the payment run cannot reach it
    transfers.transfer(&Context::new(&time), borrower.id, savings.id, Money::from_major(7_000))?;

    for month in 1..=6 {
        let due = start
            .checked_add_months(Months::new(month))
            .ok_or("date out of range")?;
        controller.advance(due - time.now());

        let ctx = Context::new(&time);
        let report = engine.process_due_payments(&ctx, ctx.today())?;
        println!(
            "{}: paid {} late {} collected {} balance {}",
            ctx.today(),
            report.paid,
            report.late,
            report.collected,
            accounts.account(borrower.id)?.balance
        );

        if report.late > 0 {
            // top up from savings for the next run
            transfers.transfer(&ctx, savings.id, borrower.id, Money::from_major(2_000))?;
        }
    }

    let view = engine.credit_view(credit.id)?;
    println!(
        "\nstatus {:?}: {} paid, {} late, {} outstanding",
        view.status,
        view.repayment.paid_installments,
        view.repayment.late_installments,
        view.repayment.outstanding
    );

    Ok(())
}
