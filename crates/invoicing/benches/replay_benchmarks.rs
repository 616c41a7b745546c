use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use einvoice_invoicing::{
    AllowanceNumber, AllowanceRecord, Invoice, InvoiceNumber, IssuanceAck, OrderId, PaymentItem,
    QueryResponse, StatusCodeTable, replay,
};

fn history(entries: usize) -> QueryResponse {
    let invoice_number = InvoiceNumber::new("AB12345678").unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let allowances = (1..=entries)
        .map(|sequence| AllowanceRecord {
            allowance_number: AllowanceNumber::for_sequence(&invoice_number, sequence),
            amount: 10,
            date: start + Duration::minutes(sequence as i64),
            // every third entry was invalidated
            vendor_status_code: if sequence % 3 == 0 { "D" } else { "A" }.to_string(),
            invalid_on: None,
            tax_amount: None,
            items: Vec::new(),
        })
        .collect();

    QueryResponse {
        invoice_number,
        order_id: OrderId::new("ORDER-BENCH").unwrap(),
        vat_number: None,
        items: vec![PaymentItem::taxed("Bulk", 1, 10 * entries as u64)],
        tax_rate: None,
        issued_on: start,
        void_on: None,
        allowances,
    }
}

fn bench_replay(c: &mut Criterion) {
    let translator = StatusCodeTable::new("bench", ["A"], ["D"]).unwrap();
    let mut group = c.benchmark_group("ledger_replay");

    for entries in [10usize, 100, 500] {
        let response = history(entries);
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &response, |b, response| {
            b.iter(|| replay(black_box(response), &translator).unwrap());
        });
    }

    group.finish();
}

fn bench_live_postings(c: &mut Criterion) {
    let ack = IssuanceAck {
        invoice_number: InvoiceNumber::new("AB12345678").unwrap(),
        issued_on: Utc::now(),
    };

    c.bench_function("live_allowance_postings_100", |b| {
        b.iter(|| {
            let mut invoice = Invoice::issue(
                &ack,
                OrderId::new("ORDER-BENCH").unwrap(),
                vec![PaymentItem::taxed("Bulk", 1, 1_000)],
                None,
                None,
            )
            .unwrap();
            for _ in 0..100 {
                invoice
                    .request_allowance(vec![PaymentItem::taxed("Refund", 1, 10)], None)
                    .unwrap();
            }
            black_box(invoice.now_amount())
        });
    });
}

criterion_group!(benches, bench_replay, bench_live_postings);
criterion_main!(benches);
