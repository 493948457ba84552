//! Option chain enumeration: strikes, contract months, instrument strings.

use anyhow::{bail, Context, Result};
use chrono::{Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use tws_ib::{ContractSpec, OptionRight};

/// `from + i * step` for `i` in `0..round((to - from) / step)`; `to` itself is
/// not included.
pub fn strike_chain(from: Decimal, to: Decimal, step: Decimal) -> Result<Vec<Decimal>> {
    if step <= Decimal::ZERO {
        bail!("strike step must be positive, got {step}");
    }
    let count = ((to - from) / step).round();
    if count <= Decimal::ZERO {
        return Ok(Vec::new());
    }
    let count = count.to_u32().context("strike chain too long")?;
    Ok((0..count).map(|i| from + Decimal::from(i) * step).collect())
}

/// Contract months `YYYYMM`, `start..start + count` months after `today`
/// taking every `step`-th.
pub fn contract_months(today: NaiveDate, start: u32, count: u32, step: u32) -> Vec<String> {
    (start..start + count)
        .step_by(step.max(1) as usize)
        .filter_map(|offset| today.checked_add_months(Months::new(offset)))
        .map(|date| date.format("%Y%m").to_string())
        .collect()
}

/// Contract month as `Mon'YY` (`201902` → `Feb'19`).
pub fn month_label(expiry: &str) -> Result<String> {
    let month = expiry.get(..6).unwrap_or(expiry);
    let date = NaiveDate::parse_from_str(&format!("{month}01"), "%Y%m%d")
        .with_context(|| format!("Invalid contract month: {expiry}"))?;
    Ok(date.format("%b'%y").to_string())
}

/// Human readable instrument id, e.g. `CL FOP (LO) Feb'19 40 CALL @NYMEX`.
/// Used as the instruments table key.
pub fn instrument_string(
    underlying: &ContractSpec,
    expiry: &str,
    strike: Decimal,
    right: OptionRight,
) -> Result<String> {
    Ok(format!(
        "{} {} ({}) {} {} {} @{}",
        underlying.symbol,
        underlying.sec_type,
        underlying.trading_class,
        month_label(expiry)?,
        strike.normalize(),
        right.long_name(),
        underlying.exchange
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn strike_chain_excludes_upper_bound() {
        let strikes = strike_chain(dec!(40), dec!(42), dec!(0.5)).unwrap();
        assert_eq!(strikes, vec![dec!(40), dec!(40.5), dec!(41), dec!(41.5)]);
    }

    #[test]
    fn strike_chain_is_exact_for_decimal_steps() {
        let strikes = strike_chain(dec!(1), dec!(2), dec!(0.1)).unwrap();
        assert_eq!(strikes.len(), 10);
        assert_eq!(strikes[9], dec!(1.9));
    }

    #[test]
    fn strike_chain_edge_cases() {
        assert!(strike_chain(dec!(40), dec!(30), dec!(1)).unwrap().is_empty());
        assert!(strike_chain(dec!(40), dec!(50), dec!(0)).is_err());
    }

    #[test]
    fn months_roll_over_year_end() {
        let today = NaiveDate::from_ymd_opt(2018, 11, 30).unwrap();
        assert_eq!(contract_months(today, 1, 3, 1), vec!["201812", "201901", "201902"]);
        assert_eq!(contract_months(today, 1, 4, 2), vec!["201812", "201902"]);
    }

    #[test]
    fn month_end_days_are_clamped() {
        let today = NaiveDate::from_ymd_opt(2019, 1, 31).unwrap();
        assert_eq!(contract_months(today, 1, 1, 1), vec!["201902"]);
    }

    #[test]
    fn instrument_string_matches_tws_description() {
        let cl = ContractSpec::new("CL", "FOP", "NYMEX", "USD").with_trading_class("LO");
        assert_eq!(
            instrument_string(&cl, "201902", dec!(40.0), OptionRight::Call).unwrap(),
            "CL FOP (LO) Feb'19 40 CALL @NYMEX"
        );
        assert_eq!(
            instrument_string(&cl, "20190215", dec!(52.5), OptionRight::Put).unwrap(),
            "CL FOP (LO) Feb'19 52.5 PUT @NYMEX"
        );
        assert!(instrument_string(&cl, "2019", dec!(1), OptionRight::Put).is_err());
    }
}
