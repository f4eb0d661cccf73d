use criterion::{criterion_group, criterion_main, Criterion};
use tabulon::{lit, sym, Assoc, Grammar, Value};

criterion_main!(benches);
criterion_group!(benches, bench_synthesis, bench_parse);

fn arithmetic() -> Grammar<Value> {
    Grammar::define(|g| {
        g.pattern("ws", r"\s+")?.skip();
        g.pattern("int", "[0-9]+")?
            .map(|text| Value::Int(text.parse().unwrap()));
        g.literal("+")?.prec(1).assoc(Assoc::Left);
        g.literal("-")?.prec(1).assoc(Assoc::Left);
        g.literal("*")?.prec(2).assoc(Assoc::Left);
        g.rule("expr", [lit("("), sym("expr"), lit(")")], |mut a| {
            a.swap_remove(1)
        })?;
        g.rule("expr", [sym("expr"), lit("+"), sym("expr")], |a| {
            Value::Int(a[0].as_int().unwrap() + a[2].as_int().unwrap())
        })?;
        g.rule("expr", [sym("expr"), lit("-"), sym("expr")], |a| {
            Value::Int(a[0].as_int().unwrap() - a[2].as_int().unwrap())
        })?;
        g.rule("expr", [sym("expr"), lit("*"), sym("expr")], |a| {
            Value::Int(a[0].as_int().unwrap() * a[2].as_int().unwrap())
        })?;
        g.rule_value("expr", [sym("int")])?;
        g.start("expr");
        Ok(())
    })
    .unwrap()
}

fn bench_synthesis(c: &mut Criterion) {
    c.bench_function("table_synthesis", |b| {
        b.iter(|| {
            let grammar = arithmetic();
            // The table is built lazily; the first parse forces it.
            grammar.parse("1").unwrap()
        });
    });
}

fn bench_parse(c: &mut Criterion) {
    let grammar = arithmetic();
    let input = format!("(1 + 2) * 3 {}", "- 4 * (5 + 6) ".repeat(64));
    grammar.parse(&input).unwrap();

    c.bench_function("parse_arithmetic", |b| {
        b.iter(|| grammar.parse(&input).unwrap());
    });
}
