use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

// A sweep shaped like the benchmark host program writes: every tasklet count
// for every DPU count, with a few repeated runs.
fn runtime_csv(n: usize) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("temp file");
    writeln!(f, "host_time,dpu_time,prepare,load,alloc,copy_in,launch,copy_out,free,nr_tasklets,nr_dpus").expect("write");
    for i in 0..n {
        let dpus = 1u32 << (i % 10);
        let tasklets = 1 + (i / 10 % 24);
        let t = 1.0 + (i % 97) as f64 * 0.01;
        writeln!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{}",
            20.0 + (i % 13) as f64,
            t * 2.0,
            t * 0.1,
            t * 0.1,
            t * 0.05,
            t * 0.2,
            t,
            t * 0.2,
            t * 0.05,
            tasklets,
            dpus
        )
        .expect("write");
    }
    f
}

fn summary_run(csv: &NamedTempFile) -> usize {
    let output = Command::new(env!("CARGO_BIN_EXE_runtimechart"))
        .args(["--csvfile", csv.path().to_string_lossy().as_ref(), "--summary_only"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .expect("runtimechart did not start");
    output.stdout.len()
}

fn bench_summary(c: &mut Criterion) {
    let csv = runtime_csv(100_000);
    c.bench_function("runtimechart_summary_1e5", |b| b.iter(|| black_box(summary_run(&csv))));
}

criterion_group!(benches, bench_summary);
criterion_main!(benches);
