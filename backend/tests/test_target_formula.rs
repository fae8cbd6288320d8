//! Tests for target formulas and formula-driven compliance targets

use compliance_search_core_rs::policy::formula::{CompiledFormula, FormulaDef, FormulaError};
use compliance_search_core_rs::policy::targets::{ComplianceTargets, FormulaTargets, TargetError, TargetStandard};
use compliance_search_core_rs::{CostCurve, CostCurvePoint, FuelingClass, Vehicle};

fn footprint_formula() -> FormulaDef {
    serde_json::from_str(
        r#"{
            "expression": {"compute": {"op": "clamp",
                "value": {"compute": {"op": "+",
                    "left": {"compute": {"op": "*", "left": {"param": "slope"}, "right": {"field": "footprint_ft2"}}},
                    "right": {"param": "intercept"}}},
                "min": {"value": 150.0},
                "max": {"value": 250.0}}},
            "parameters": {"slope": 4.0, "intercept": 20.0}
        }"#,
    )
    .unwrap()
}

fn vehicle(reg_class: &str, model_year: i32, footprint: f64) -> Vehicle {
    let curve = CostCurve::new(vec![
        CostCurvePoint::new(100.0, 30_000.0),
        CostCurvePoint::new(300.0, 28_000.0),
    ])
    .unwrap();
    Vehicle::new("v1", "OEM_A", model_year, "non_hauling.ICE", reg_class, FuelingClass::Ice, 1.0, curve)
        .with_attribute("footprint_ft2", footprint)
}

fn standard(start_year: i32, lifetime_vmt: f64, target: FormulaDef) -> TargetStandard {
    TargetStandard {
        reg_class_id: "car".to_string(),
        start_year,
        lifetime_vmt,
        target_co2e_gpmi: target,
    }
}

#[test]
fn test_json_formula_compiles_and_evaluates() {
    let formula = CompiledFormula::compile(&footprint_formula()).unwrap();

    assert_eq!(formula.fields(), &["footprint_ft2".to_string()]);
    assert_eq!(formula.evaluate(&[20.0]).unwrap(), 150.0);
    assert_eq!(formula.evaluate(&[45.0]).unwrap(), 200.0);
    assert_eq!(formula.evaluate(&[60.0]).unwrap(), 250.0);
}

#[test]
fn test_min_max_and_rounding_ops() {
    let def: FormulaDef = serde_json::from_str(
        r#"{"expression": {"compute": {"op": "max", "values": [
            {"compute": {"op": "floor", "value": {"field": "a"}}},
            {"compute": {"op": "ceil", "value": {"field": "b"}}},
            {"compute": {"op": "abs", "value": {"field": "c"}}}
        ]}}}"#,
    )
    .unwrap();
    let formula = CompiledFormula::compile(&def).unwrap();

    assert_eq!(formula.evaluate(&[3.7, 1.2, -2.5]).unwrap(), 3.0);
    assert_eq!(formula.evaluate(&[1.0, 4.1, -2.5]).unwrap(), 5.0);
    assert_eq!(formula.evaluate(&[1.0, 1.0, -9.0]).unwrap(), 9.0);
}

#[test]
fn test_safe_division_uses_default() {
    let def: FormulaDef = serde_json::from_str(
        r#"{"expression": {"compute": {"op": "div0",
            "numerator": {"field": "payload"},
            "denominator": {"field": "towing"},
            "default": {"value": 7.0}}}}"#,
    )
    .unwrap();
    let formula = CompiledFormula::compile(&def).unwrap();

    assert_eq!(formula.evaluate(&[10.0, 4.0]).unwrap(), 2.5);
    assert_eq!(formula.evaluate(&[10.0, 0.0]).unwrap(), 7.0);
}

#[test]
fn test_compile_errors() {
    let missing_param: FormulaDef = serde_json::from_str(r#"{"expression": {"param": "slope"}}"#).unwrap();
    assert_eq!(
        CompiledFormula::compile(&missing_param),
        Err(FormulaError::ParameterNotFound("slope".to_string()))
    );

    let empty_list: FormulaDef =
        serde_json::from_str(r#"{"expression": {"compute": {"op": "min", "values": []}}}"#).unwrap();
    assert_eq!(CompiledFormula::compile(&empty_list), Err(FormulaError::EmptyValueList));

    let non_finite = FormulaDef::constant(f64::NAN);
    assert_eq!(CompiledFormula::compile(&non_finite), Err(FormulaError::NonFinite));
}

#[test]
fn test_too_few_slots_is_missing_field() {
    let formula = CompiledFormula::compile(&footprint_formula()).unwrap();
    assert_eq!(
        formula.evaluate(&[]),
        Err(FormulaError::FieldNotProvided("footprint_ft2".to_string()))
    );
}

#[test]
fn test_normalized_factors() {
    let targets = FormulaTargets::compile(vec![standard(2020, 200_000.0, footprint_formula())]).unwrap();
    let v = vehicle("car", 2021, 45.0);

    assert_eq!(targets.target_co2e_gpmi(&v).unwrap(), 200.0);
    assert!((targets.normalized_cert_co2e_mg(&v).unwrap() - 0.2).abs() < 1e-12);
    assert!((targets.normalized_target_co2e_mg(&v).unwrap() - 40.0).abs() < 1e-9);
}

#[test]
fn test_standards_step_by_start_year() {
    let targets = FormulaTargets::compile(vec![
        standard(2026, 200_000.0, FormulaDef::constant(150.0)),
        standard(2020, 200_000.0, FormulaDef::constant(180.0)),
    ])
    .unwrap();

    assert_eq!(targets.target_co2e_gpmi(&vehicle("car", 2020, 45.0)).unwrap(), 180.0);
    assert_eq!(targets.target_co2e_gpmi(&vehicle("car", 2025, 45.0)).unwrap(), 180.0);
    assert_eq!(targets.target_co2e_gpmi(&vehicle("car", 2026, 45.0)).unwrap(), 150.0);
    assert_eq!(targets.target_co2e_gpmi(&vehicle("car", 2035, 45.0)).unwrap(), 150.0);

    assert_eq!(
        targets.target_co2e_gpmi(&vehicle("car", 2019, 45.0)),
        Err(TargetError::MissingStandard {
            reg_class_id: "car".to_string(),
            calendar_year: 2019,
        })
    );
}

#[test]
fn test_unknown_reg_class_and_missing_attribute() {
    let targets = FormulaTargets::compile(vec![standard(2020, 200_000.0, footprint_formula())]).unwrap();

    assert_eq!(
        targets.normalized_cert_co2e_mg(&vehicle("truck", 2021, 45.0)),
        Err(TargetError::UnknownRegClass("truck".to_string()))
    );

    let curve = CostCurve::new(vec![CostCurvePoint::new(100.0, 30_000.0)]).unwrap();
    let bare = Vehicle::new("v2", "OEM_A", 2021, "non_hauling.ICE", "car", FuelingClass::Ice, 1.0, curve);
    assert_eq!(
        targets.normalized_target_co2e_mg(&bare),
        Err(TargetError::Formula {
            vehicle_id: "v2".to_string(),
            source: FormulaError::FieldNotProvided("footprint_ft2".to_string()),
        })
    );
}
