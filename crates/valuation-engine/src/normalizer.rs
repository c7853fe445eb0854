use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use valuation_core::{FinancialHistory, FinancialPeriod, RawPeriodRecord, UnitTag, ValuationError};

/// Something the normalizer had to fill in or drop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationNote {
    MissingPeriodDate { index: usize },
    DuplicatePeriod { date: NaiveDate },
    DerivedFreeCashFlow { date: NaiveDate },
    DerivedWorkingCapital { date: NaiveDate },
    EstimatedDepreciation { date: NaiveDate, estimate: f64 },
    DefaultedField { date: NaiveDate, field: String },
}

#[derive(Debug, Clone)]
pub struct NormalizedHistory {
    pub history: FinancialHistory,
    pub notes: Vec<NormalizationNote>,
}

/// Converts provider records into canonical-unit `FinancialPeriod`s.
///
/// This is the only place a provider scale is applied; everything downstream
/// works in the canonical unit of the records' currency.
#[derive(Debug, Clone, Default)]
pub struct PeriodNormalizer;

impl PeriodNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, records: &[RawPeriodRecord]) -> Result<NormalizedHistory, ValuationError> {
        let first = records.first().ok_or_else(|| {
            ValuationError::InsufficientData("no financial periods supplied".to_string())
        })?;
        let canonical = UnitTag::canonical(first.unit.currency);

        let mut notes = Vec::new();
        let mut seen = HashSet::new();
        let mut periods = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if record.unit.currency != canonical.currency {
                return Err(ValuationError::UnitMismatch {
                    expected: canonical,
                    found: record.unit,
                });
            }
            let Some(date) = record.period_end_date else {
                tracing::warn!("Dropping period record {} without an end date", index);
                notes.push(NormalizationNote::MissingPeriodDate { index });
                continue;
            };
            if !seen.insert(date) {
                tracing::warn!("Dropping duplicate period {}", date);
                notes.push(NormalizationNote::DuplicatePeriod { date });
                continue;
            }
            periods.push(self.normalize_record(record, date, &mut notes));
        }

        if periods.is_empty() {
            return Err(ValuationError::InsufficientData(
                "no dated financial periods supplied".to_string(),
            ));
        }

        let history = FinancialHistory::new(canonical, periods)?;
        tracing::debug!(
            "Normalized {} periods to {} ({} notes)",
            history.len(),
            canonical,
            notes.len()
        );
        Ok(NormalizedHistory { history, notes })
    }

    fn normalize_record(
        &self,
        record: &RawPeriodRecord,
        date: NaiveDate,
        notes: &mut Vec<NormalizationNote>,
    ) -> FinancialPeriod {
        let factor = record.unit.scale.factor();
        let scale = |v: Option<f64>| v.filter(|x| x.is_finite()).map(|x| x * factor);

        let net_income = scale(record.net_income);
        let revenue = scale(record.operating_revenue);
        let operating_profit = scale(record.operating_profit);
        let operating_cash_flow = scale(record.operating_cash_flow);
        // providers disagree on the sign of capex; treat it as cash spent
        let capex = scale(record.capital_expenditure).map(f64::abs);

        let free_cash_flow = match scale(record.free_cash_flow) {
            Some(fcf) => Some(fcf),
            None => operating_cash_flow.map(|ocf| {
                notes.push(NormalizationNote::DerivedFreeCashFlow { date });
                ocf - capex.unwrap_or(0.0)
            }),
        };

        let working_capital = match scale(record.working_capital) {
            Some(wc) => Some(wc),
            None => match (scale(record.current_assets), scale(record.current_liabilities)) {
                (Some(assets), Some(liabilities)) => {
                    notes.push(NormalizationNote::DerivedWorkingCapital { date });
                    Some(assets - liabilities)
                }
                _ => None,
            },
        };

        let depreciation = match scale(record.depreciation_and_amortization) {
            Some(da) => Some(da),
            None => revenue.map(|rev| {
                let estimate = estimate_depreciation(net_income, operating_cash_flow, rev);
                tracing::warn!("{}: depreciation missing, estimated at {:.2}", date, estimate);
                notes.push(NormalizationNote::EstimatedDepreciation { date, estimate });
                estimate
            }),
        };

        let mut or_zero = |value: Option<f64>, field: &str| {
            value.unwrap_or_else(|| {
                tracing::warn!("{}: {} missing, defaulting to 0", date, field);
                notes.push(NormalizationNote::DefaultedField {
                    date,
                    field: field.to_string(),
                });
                0.0
            })
        };

        FinancialPeriod {
            period_end_date: date,
            net_income: or_zero(net_income, "net_income"),
            operating_revenue: or_zero(revenue, "operating_revenue"),
            operating_profit: or_zero(operating_profit, "operating_profit"),
            depreciation_and_amortization: or_zero(depreciation, "depreciation_and_amortization"),
            capital_expenditure: or_zero(capex, "capital_expenditure"),
            free_cash_flow: or_zero(free_cash_flow, "free_cash_flow"),
            working_capital: or_zero(working_capital, "working_capital"),
        }
    }
}

/// Rough D&A when the cash-flow statement omits it. Non-cash charges are
/// most of the gap between operating cash flow and net income.
fn estimate_depreciation(net_income: Option<f64>, operating_cash_flow: Option<f64>, revenue: f64) -> f64 {
    match (net_income, operating_cash_flow) {
        (Some(ni), Some(ocf)) if ni > 0.0 && ocf > ni => ((ocf - ni) * 0.6).max(revenue * 0.03),
        _ => revenue * 0.04,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use valuation_core::{Currency, UnitScale};

    fn date(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 12, 31).unwrap()
    }

    fn yi() -> UnitTag {
        UnitTag::new(Currency::Cny, UnitScale::HundredMillion)
    }

    fn full_record(y: i32, unit: UnitTag) -> RawPeriodRecord {
        RawPeriodRecord {
            net_income: Some(10.0),
            operating_revenue: Some(100.0),
            operating_profit: Some(13.0),
            depreciation_and_amortization: Some(4.0),
            capital_expenditure: Some(-6.0),
            free_cash_flow: Some(9.0),
            working_capital: Some(20.0),
            ..RawPeriodRecord::new(date(y), unit)
        }
    }

    #[test]
    fn test_zero_records_is_insufficient_data() {
        let err = PeriodNormalizer::new().normalize(&[]).unwrap_err();
        assert!(matches!(err, ValuationError::InsufficientData(_)));
    }

    #[test]
    fn test_scale_converted_once_to_canonical() {
        let out = PeriodNormalizer::new()
            .normalize(&[full_record(2023, yi())])
            .unwrap();

        assert_eq!(out.history.unit(), UnitTag::canonical(Currency::Cny));
        let p = out.history.latest();
        assert_relative_eq!(p.net_income, 1.0e9);
        assert_relative_eq!(p.operating_revenue, 1.0e10);
        assert_relative_eq!(p.free_cash_flow, 9.0e8);
        // negative capex from the provider is stored as spend
        assert_relative_eq!(p.capital_expenditure, 6.0e8);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn test_mixed_scales_same_currency() {
        let wan = UnitTag::new(Currency::Cny, UnitScale::TenThousand);
        let mut older = full_record(2022, wan);
        older.net_income = Some(90_000.0);

        let out = PeriodNormalizer::new()
            .normalize(&[full_record(2023, yi()), older])
            .unwrap();

        let periods = out.history.periods();
        assert_relative_eq!(periods[0].net_income, 1.0e9);
        assert_relative_eq!(periods[1].net_income, 9.0e8);
    }

    #[test]
    fn test_currency_mismatch_fails() {
        let usd = UnitTag::canonical(Currency::Usd);
        let err = PeriodNormalizer::new()
            .normalize(&[full_record(2023, yi()), full_record(2022, usd)])
            .unwrap_err();
        assert!(matches!(err, ValuationError::UnitMismatch { .. }));
    }

    #[test]
    fn test_derived_fields() {
        let unit = UnitTag::canonical(Currency::Cny);
        let record = RawPeriodRecord {
            net_income: Some(100.0),
            operating_revenue: Some(1000.0),
            operating_profit: Some(130.0),
            capital_expenditure: Some(40.0),
            operating_cash_flow: Some(150.0),
            current_assets: Some(500.0),
            current_liabilities: Some(320.0),
            ..RawPeriodRecord::new(date(2023), unit)
        };

        let out = PeriodNormalizer::new().normalize(&[record]).unwrap();
        let p = out.history.latest();

        assert_relative_eq!(p.free_cash_flow, 110.0);
        assert_relative_eq!(p.working_capital, 180.0);
        // max((150 - 100) * 0.6, 1000 * 0.03) = 30
        assert_relative_eq!(p.depreciation_and_amortization, 30.0);
        assert!(out.notes.contains(&NormalizationNote::DerivedFreeCashFlow { date: date(2023) }));
        assert!(out.notes.contains(&NormalizationNote::DerivedWorkingCapital { date: date(2023) }));
    }

    #[test]
    fn test_depreciation_fallback_without_cash_flow() {
        assert_relative_eq!(estimate_depreciation(Some(-5.0), Some(10.0), 1000.0), 40.0);
        assert_relative_eq!(estimate_depreciation(Some(100.0), None, 1000.0), 40.0);
        assert_relative_eq!(estimate_depreciation(Some(100.0), Some(300.0), 1000.0), 120.0);
    }

    #[test]
    fn test_missing_fields_default_to_zero_with_notes() {
        let unit = UnitTag::canonical(Currency::Cny);
        let record = RawPeriodRecord {
            net_income: Some(50.0),
            ..RawPeriodRecord::new(date(2023), unit)
        };

        let out = PeriodNormalizer::new().normalize(&[record]).unwrap();
        let p = out.history.latest();

        assert_eq!(p.free_cash_flow, 0.0);
        assert_eq!(p.working_capital, 0.0);
        let defaulted = out
            .notes
            .iter()
            .filter(|n| matches!(n, NormalizationNote::DefaultedField { .. }))
            .count();
        // revenue, operating profit, D&A, capex, FCF, working capital
        assert_eq!(defaulted, 6);
    }

    #[test]
    fn test_undated_and_duplicate_records_dropped() {
        let unit = UnitTag::canonical(Currency::Cny);
        let mut undated = full_record(2021, unit);
        undated.period_end_date = None;

        let out = PeriodNormalizer::new()
            .normalize(&[full_record(2022, unit), full_record(2023, unit), full_record(2022, unit), undated])
            .unwrap();

        assert_eq!(out.history.len(), 2);
        assert_eq!(out.history.latest().period_end_date, date(2023));
        assert!(out.notes.contains(&NormalizationNote::DuplicatePeriod { date: date(2022) }));
        assert!(out.notes.contains(&NormalizationNote::MissingPeriodDate { index: 3 }));
    }

    #[test]
    fn test_only_undated_records_is_insufficient() {
        let mut undated = full_record(2021, yi());
        undated.period_end_date = None;
        assert!(matches!(
            PeriodNormalizer::new().normalize(&[undated]),
            Err(ValuationError::InsufficientData(_))
        ));
    }
}
