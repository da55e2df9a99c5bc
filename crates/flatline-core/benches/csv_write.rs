use flatline_core::{CsvFormat, CsvGzSink, Row, StreamSpec};

fn synthetic_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            Row::new()
                .with("work_id", format!("https://openalex.org/W{i}"))
                .with("topic_id", format!("https://openalex.org/T{}", i % 4500))
                .with("score", (i % 1000) as f64 / 1000.0)
        })
        .collect()
}

#[divan::bench(args = [1, 6, 9])]
fn csv_gz_write(bencher: divan::Bencher, level: u32) {
    let rows = synthetic_rows(8192);
    let dir = tempfile::tempdir().unwrap();
    let spec = StreamSpec::new(
        "topics",
        &["work_id", "topic_id", "score"],
        dir.path().join("works_topics.csv.gz"),
    );
    let format = CsvFormat {
        level,
        ..CsvFormat::default()
    };
    bencher.bench(|| {
        let mut sink = CsvGzSink::create(&spec, &format).unwrap();
        for row in &rows {
            sink.write_row(row).unwrap();
        }
        sink.finalize().unwrap();
    });
}

fn main() {
    divan::main();
}
