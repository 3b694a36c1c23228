use crate::sensor::SensorState;
use anyhow::{Context, Result};

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "unknown".to_string())
}

fn fmt_change(value: Option<f64>) -> String {
    value
        .map(|c| format!("{:+.2}%", c))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn print_table(states: &[SensorState]) {
    println!(
        "\n{:<48} {:>18} {:<5} {:>10} {:>10} {:>10} {:>10} {:>20}",
        "Entity", "State", "Unit", "1h", "24h", "7d", "30d", "Market cap"
    );
    println!("{}", "-".repeat(138));
    for s in states {
        let a = &s.attributes;
        println!(
            "{:<48} {:>18} {:<5} {:>10} {:>10} {:>10} {:>10} {:>20}",
            s.entity_id,
            fmt_opt(s.state, 2),
            s.unit_of_measurement,
            fmt_change(a.change_1h),
            fmt_change(a.change_24h),
            fmt_change(a.change_7d),
            fmt_change(a.change_30d),
            fmt_opt(a.market_cap, 0),
        );
    }
    println!();
}

pub fn print_json(states: &[SensorState]) -> Result<()> {
    let json = serde_json::to_string_pretty(states).context("serializing sensor states")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_values_render_as_unknown() {
        assert_eq!(fmt_opt(None, 2), "unknown");
        assert_eq!(fmt_change(None), "unknown");
        assert_eq!(fmt_opt(Some(130000.0), 2), "130000.00");
        assert_eq!(fmt_change(Some(-2.3)), "-2.30%");
        assert_eq!(fmt_change(Some(5.0)), "+5.00%");
    }
}
