use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde_json::Value;
use std::io::Write;
use std::time::Duration;

use crate::check::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored text for a terminal
    Console,
    /// Pretty-printed JSON of the underlying records
    Json,
    /// Markdown suitable for pasting into notes
    Markdown,
}

/// One command's result: a headline, human lines, and the raw record.
#[derive(Debug, Clone)]
pub struct Reading {
    pub title: String,
    pub lines: Vec<String>,
    pub data: Value,
    pub narration: Option<String>,
}

impl Reading {
    pub fn new(title: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            data,
            narration: None,
        }
    }

    #[must_use]
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }
}

pub fn write_reading(out: &mut dyn Write, format: ReportFormat, reading: &Reading) -> Result<()> {
    match format {
        ReportFormat::Json => {
            let mut data = reading.data.clone();
            if let (Some(text), Value::Object(map)) = (&reading.narration, &mut data) {
                map.insert("narration".to_string(), Value::String(text.clone()));
            }
            writeln!(out, "{}", serde_json::to_string_pretty(&data)?)?;
        }
        ReportFormat::Markdown => {
            writeln!(out, "## {}\n", reading.title)?;
            for line in &reading.lines {
                writeln!(out, "- {line}")?;
            }
            if let Some(text) = &reading.narration {
                writeln!(out)?;
                for line in text.lines() {
                    writeln!(out, "> {line}")?;
                }
            }
        }
        ReportFormat::Console => {
            writeln!(out, "{}", reading.title.bright_magenta().bold())?;
            for line in &reading.lines {
                writeln!(out, "  {line}")?;
            }
            if let Some(text) = &reading.narration {
                writeln!(out)?;
                writeln!(out, "{}", text.italic())?;
            }
        }
    }
    Ok(())
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[CheckResult],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Determinism Check Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "============================".cyan())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    writeln!(out, "Total checks: {total}")?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (total - passed).to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(passed, total))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(out, "{status} {}", result.check_name.bold())?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, results: &[CheckResult]) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(results)?)?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[CheckResult]) -> Result<()> {
    writeln!(out, "# Oracle Determinism Checks\n")?;
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total checks**: {total}")?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}", total - passed)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(passed, total))?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(out, "### {status} {}\n", result.check_name)?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(passed: bool) -> CheckResult {
        CheckResult {
            check_name: "no-repeat".to_string(),
            passed,
            iterations_run: 4,
            successful_iterations: if passed { 4 } else { 3 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["1337#2: celtic-cross repeated a card".to_string()]
            },
            average_duration: Duration::from_micros(40),
        }
    }

    fn render(format: ReportFormat, reading: &Reading) -> String {
        let mut buf = Vec::new();
        write_reading(&mut buf, format, reading).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn json_reading_carries_narration() {
        let mut reading = Reading::new("今日签", json!({ "cardId": 3 }));
        reading.narration = Some("今日信号已接收。".to_string());
        let parsed: Value = serde_json::from_str(&render(ReportFormat::Json, &reading)).unwrap();
        assert_eq!(parsed["cardId"], 3);
        assert_eq!(parsed["narration"], "今日信号已接收。");
    }

    #[test]
    fn markdown_reading_lists_lines() {
        let reading = Reading::new("甲辰日", Value::Null)
            .line("五行：阳木")
            .line("方位：东");
        let text = render(ReportFormat::Markdown, &reading);
        assert!(text.starts_with("## 甲辰日"));
        assert!(text.contains("- 方位：东"));
    }

    #[test]
    fn markdown_report_lists_failures() {
        let mut buf = Vec::new();
        generate_markdown_report(&mut buf, &[sample(true), sample(false)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("- **Failed**: 1"));
        assert!(text.contains("celtic-cross repeated a card"));
    }

    #[test]
    fn json_report_round_trips_names() {
        let mut buf = Vec::new();
        generate_json_report(&mut buf, &[sample(true)]).unwrap();
        let parsed: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0]["check_name"], "no-repeat");
    }

    #[test]
    fn console_report_handles_no_results() {
        let mut buf = Vec::new();
        generate_console_report(&mut buf, &[], Duration::ZERO).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Success rate: 0.0%"));
    }
}
