//! Run reports: the flat `KEY=value` result file, a console summary table,
//! and CSV/JSON export.
//!
//! `RunTime(ms)` is the run time truncated to whole milliseconds, while
//! `Throughput(ops/sec)` is computed from the fractional run time, so the
//! throughput cannot be recomputed exactly from `OPERATIONS` and `RunTime(ms)`.

use crate::{BenchResult, RunResult, RunSpec};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::Path;

pub const JSON_FILE: &str = "run_result.json";
pub const CSV_FILE: &str = "run_results.csv";

// ────────────────────────────────────────────────────────────────────────────────
// Result file
// ────────────────────────────────────────────────────────────────────────────────

/// Render the result file. Sections are separated by a blank line.
pub fn render_report(spec: &RunSpec, result: &RunResult) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "DBMS={}", spec.backend());
    let _ = writeln!(out, "WORKLOAD={}", spec.workload());
    let _ = writeln!(out, "DEPTH={}", spec.depth());
    let _ = writeln!(out, "THREADS={}", spec.threads());
    let _ = writeln!(out, "OPERATIONS={}", result.total_ops);
    out.push('\n');

    let _ = writeln!(out, "OVERALL RunTime(ms)={}", result.total_time_ms());
    let _ = writeln!(
        out,
        "OVERALL Throughput(ops/sec)={:.2}",
        result.throughput_ops_per_sec
    );
    out.push('\n');

    let _ = writeln!(out, "LATENCY AvgLatency(us)={:.2}", result.avg_latency_us);
    let _ = writeln!(out, "LATENCY P50Latency(us)={}", result.p50_latency_us);
    let _ = writeln!(out, "LATENCY P95Latency(us)={}", result.p95_latency_us);
    let _ = writeln!(out, "LATENCY P99Latency(us)={}", result.p99_latency_us);
    let _ = writeln!(out, "LATENCY MaxLatency(us)={}", result.max_latency_us);
    out.push('\n');

    let _ = writeln!(out, "STATUS Succeeded={}", result.succeeded);
    let _ = writeln!(out, "STATUS Failed={}", result.failed);
    out
}

pub fn write_report(path: &Path, spec: &RunSpec, result: &RunResult) -> BenchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_report(spec, result))?;
    tracing::info!(path = %path.display(), "result file written");
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

pub fn print_summary(spec: &RunSpec, result: &RunResult) {
    println!(
        "\n{}",
        format!(
            "━━━ {} / {} (depth {}, {} threads) ━━━",
            spec.backend(),
            spec.workload(),
            spec.depth(),
            spec.threads()
        )
        .bold()
        .cyan()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Metric", "Value"]);

    let failed_cell = if result.failed == 0 {
        Cell::new(result.failed).fg(Color::Green)
    } else {
        Cell::new(result.failed).fg(Color::Red)
    };

    table.add_row(vec![Cell::new("Operations"), Cell::new(format_count(result.total_ops))]);
    table.add_row(vec![
        Cell::new("Run time"),
        Cell::new(format!("{} ms", result.total_time_ms())),
    ]);
    table.add_row(vec![
        Cell::new("Throughput"),
        Cell::new(format!("{} ops/s", format_throughput(result.throughput_ops_per_sec))),
    ]);
    table.add_row(vec![
        Cell::new("Mean (μs)"),
        Cell::new(format!("{:.2}", result.avg_latency_us)),
    ]);
    table.add_row(vec![Cell::new("p50 (μs)"), Cell::new(result.p50_latency_us)]);
    table.add_row(vec![Cell::new("p95 (μs)"), Cell::new(result.p95_latency_us)]);
    table.add_row(vec![Cell::new("p99 (μs)"), Cell::new(result.p99_latency_us)]);
    table.add_row(vec![Cell::new("max (μs)"), Cell::new(result.max_latency_us)]);
    table.add_row(vec![
        Cell::new("Succeeded"),
        Cell::new(result.succeeded).fg(Color::Green),
    ]);
    table.add_row(vec![Cell::new("Failed"), failed_cell]);

    println!("{table}");

    if result.failed > 0 {
        println!(
            "  {} {} of {} operations failed (run with -v for details)",
            "WARN".yellow(),
            result.failed,
            result.total_ops
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Export
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RunRecord<'a> {
    spec: &'a RunSpec,
    result: &'a RunResult,
}

/// One CSV line; `spec` and `result` flattened by hand since the csv writer
/// does not support nested records.
#[derive(Serialize)]
struct CsvRow {
    dbms: String,
    workload: String,
    depth: u32,
    threads: usize,
    operations: usize,
    runtime_ms: u64,
    throughput_ops_sec: String,
    avg_latency_us: String,
    p50_latency_us: u64,
    p95_latency_us: u64,
    p99_latency_us: u64,
    max_latency_us: u64,
    succeeded: usize,
    failed: usize,
}

pub fn export_json(spec: &RunSpec, result: &RunResult, path: &Path) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(&RunRecord { spec, result })
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

/// Append one row, writing the header first if the file is new or empty.
pub fn export_csv(spec: &RunSpec, result: &RunResult, path: &Path) -> BenchResult<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);

    wtr.serialize(CsvRow {
        dbms: spec.backend().to_string(),
        workload: spec.workload().to_string(),
        depth: spec.depth(),
        threads: spec.threads(),
        operations: result.total_ops,
        runtime_ms: result.total_time_ms() as u64,
        throughput_ops_sec: format!("{:.2}", result.throughput_ops_per_sec),
        avg_latency_us: format!("{:.2}", result.avg_latency_us),
        p50_latency_us: result.p50_latency_us,
        p95_latency_us: result.p95_latency_us,
        p99_latency_us: result.p99_latency_us,
        max_latency_us: result.max_latency_us,
        succeeded: result.succeeded,
        failed: result.failed,
    })
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    wtr.flush()?;
    println!("  CSV appended to {}", path.display());
    Ok(())
}

/// Write both export files into `dir`, creating it if needed.
pub fn export(dir: &Path, spec: &RunSpec, result: &RunResult) -> BenchResult<()> {
    std::fs::create_dir_all(dir)?;
    export_json(spec, result, &dir.join(JSON_FILE))?;
    export_csv(spec, result, &dir.join(CSV_FILE))?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_throughput(t: f64) -> String {
    if t >= 1_000_000.0 {
        format!("{:.2}M", t / 1_000_000.0)
    } else if t >= 1_000.0 {
        format!("{:.1}K", t / 1_000.0)
    } else {
        format!("{:.2}", t)
    }
}

fn format_count(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, WorkloadKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample() -> (RunSpec, RunResult) {
        let spec = RunSpec::new(Backend::Postgres, WorkloadKind::Fof, 3, 1_000, 4, None).unwrap();
        let result = RunResult {
            total_ops: 1_000,
            total_time: Duration::from_micros(1_234_567),
            throughput_ops_per_sec: 810.3748,
            avg_latency_us: 4_921.554,
            p50_latency_us: 4_100,
            p95_latency_us: 9_021,
            p99_latency_us: 15_010,
            max_latency_us: 21_000,
            succeeded: 998,
            failed: 2,
        };
        (spec, result)
    }

    #[test]
    fn report_matches_result_file_layout() {
        let (spec, result) = sample();
        let expected = "\
DBMS=POSTGRES
WORKLOAD=FOF
DEPTH=3
THREADS=4
OPERATIONS=1000

OVERALL RunTime(ms)=1234
OVERALL Throughput(ops/sec)=810.37

LATENCY AvgLatency(us)=4921.55
LATENCY P50Latency(us)=4100
LATENCY P95Latency(us)=9021
LATENCY P99Latency(us)=15010
LATENCY MaxLatency(us)=21000

STATUS Succeeded=998
STATUS Failed=2
";
        assert_eq!(render_report(&spec, &result), expected);
    }

    #[test]
    fn workload_names_are_upper_snake_case() {
        let spec =
            RunSpec::new(Backend::Neo4j, WorkloadKind::ShortestPath, 2, 10, 1, None).unwrap();
        let (_, result) = sample();
        let text = render_report(&spec, &result);
        assert!(text.starts_with("DBMS=NEO4J\nWORKLOAD=SHORTEST_PATH\n"));
    }

    #[test]
    fn write_report_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results/pg/fof.txt");
        let (spec, result) = sample();
        write_report(&path, &spec, &result).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("STATUS Failed=2"));
    }

    #[test]
    fn csv_export_appends_with_single_header() {
        let tmp = TempDir::new().unwrap();
        let (spec, result) = sample();
        export(tmp.path(), &spec, &result).unwrap();
        export(tmp.path(), &spec, &result).unwrap();

        let csv = std::fs::read_to_string(tmp.path().join(CSV_FILE)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("dbms,workload,depth,threads"));
        assert!(lines[1].starts_with("POSTGRES,FOF,3,4,1000,1234,810.37"));
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn json_export_nests_spec_and_result() {
        let tmp = TempDir::new().unwrap();
        let (spec, result) = sample();
        export(tmp.path(), &spec, &result).unwrap();

        let json = std::fs::read_to_string(tmp.path().join(JSON_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spec"]["backend"], "POSTGRES");
        assert_eq!(value["spec"]["workload"], "FOF");
        assert_eq!(value["result"]["total_time_ms"], 1234);
        assert_eq!(value["result"]["p99_latency_us"], 15010);
    }

    #[test]
    fn throughput_uses_fractional_run_time() {
        let (spec, mut result) = sample();
        result.total_ops = 3;
        result.total_time = Duration::from_micros(1_500);
        result.throughput_ops_per_sec = crate::stats::throughput(3, result.total_time);

        let text = render_report(&spec, &result);
        assert!(text.contains("OVERALL RunTime(ms)=1\n"));
        // 3 ops / 1.5 ms, not 3 ops / 1 ms.
        assert!(text.contains("OVERALL Throughput(ops/sec)=2000.00\n"));
    }

    #[test]
    fn throughput_formatting() {
        assert_eq!(format_throughput(810.374), "810.37");
        assert_eq!(format_throughput(12_500.0), "12.5K");
        assert_eq!(format_throughput(2_500_000.0), "2.50M");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(12_000), "12.0K");
    }
}
