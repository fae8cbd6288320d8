//! Tests for tech/share sweep generation
//!
//! Two single-vehicle market classes "A" and "B" at the top of the tree.

use compliance_search_core_rs::models::option::{SweepRow, TechOption, VehicleOutcome};
use compliance_search_core_rs::policy::constraints::ShareConstraintTable;
use compliance_search_core_rs::policy::context::{CategoryShareEntry, MarketContextTable, SalesEntry};
use compliance_search_core_rs::policy::formula::FormulaDef;
use compliance_search_core_rs::policy::targets::{FormulaTargets, TargetStandard};
use compliance_search_core_rs::search::builder::{BuiltComposites, CompositeVehicleBuilder};
use compliance_search_core_rs::search::sweep::{NarrowingPolicy, SweepRequest, TechNarrowing, TechShareSweepGenerator};
use compliance_search_core_rs::{
    CandidateDecision, ConsumerResponse, CostCurve, CostCurvePoint, FuelingClass, MarketClassConfig,
    ProductionOption, SearchConfig, SearchError, Vehicle,
};

struct Fixture {
    market_classes: MarketClassConfig,
    context: MarketContextTable,
    constraints: ShareConstraintTable,
    built: BuiltComposites,
}

fn vehicle(id: &str, market_class: &str, fueling_class: FuelingClass) -> Vehicle {
    let curve = CostCurve::new(vec![
        CostCurvePoint::new(100.0, 11_000.0),
        CostCurvePoint::new(300.0, 10_000.0),
    ])
    .unwrap();
    Vehicle::new(id, "OEM_A", 2020, market_class, "car", fueling_class, 0.5, curve)
}

fn fixture(responsive: bool, b_fueling: FuelingClass) -> Fixture {
    let market_classes = MarketClassConfig {
        market_classes: vec!["A".to_string(), "B".to_string()],
        responsive_categories: if responsive {
            ["A", "B"].iter().map(|s| s.to_string()).collect()
        } else {
            Default::default()
        },
        reg_classes: vec!["car".to_string()],
    };
    let context = MarketContextTable {
        category_shares: ["A", "B"]
            .iter()
            .map(|c| CategoryShareEntry {
                category: c.to_string(),
                start_year: 2020,
                share: 0.5,
            })
            .collect(),
        sales: vec![SalesEntry {
            compliance_id: "OEM_A".to_string(),
            calendar_year: 2021,
            size_class: None,
            sales: 1000.0,
        }],
    };
    let targets = FormulaTargets::compile(vec![TargetStandard {
        reg_class_id: "car".to_string(),
        start_year: 2020,
        lifetime_vmt: 1_000_000.0,
        target_co2e_gpmi: FormulaDef::constant(200.0),
    }])
    .unwrap();
    let vehicles = vec![
        vehicle("a", "A", FuelingClass::Ice),
        vehicle("b", "B", b_fueling),
    ];
    let built = CompositeVehicleBuilder::new(&market_classes, &vehicles, &context, &targets)
        .build("OEM_A", 2021)
        .unwrap();

    Fixture {
        market_classes,
        context,
        constraints: ShareConstraintTable::default(),
        built,
    }
}

fn config(ice_options: usize) -> SearchConfig {
    SearchConfig {
        num_tech_options_per_ice_vehicle: ice_options,
        num_tech_options_per_bev_vehicle: 3,
        num_market_share_options: 5,
        ..SearchConfig::default()
    }
}

fn first_pass(share_range: f64) -> SweepRequest<'static> {
    SweepRequest {
        calendar_year: 2021,
        candidates: None,
        share_range,
        consumer_response: None,
    }
}

fn levels_of(rows: &[SweepRow], vehicle_id: &str) -> Vec<f64> {
    let mut levels: Vec<f64> = rows.iter().map(|r| r.tech[vehicle_id].co2e_gpmi).collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
}

fn candidate(a_level: f64, a_sales: f64, b_level: f64, b_sales: f64) -> ProductionOption {
    let tech = |level: f64| TechOption {
        co2e_gpmi: level,
        kwh_pmi: 0.0,
        cost_dollars: 0.0,
        generalized_cost_dollars: 0.0,
    };
    let outcome = |sales: f64| VehicleOutcome {
        sales,
        ..VehicleOutcome::default()
    };
    ProductionOption {
        tech: [("A.car".to_string(), tech(a_level)), ("B.car".to_string(), tech(b_level))]
            .into_iter()
            .collect(),
        vehicles: [("A.car".to_string(), outcome(a_sales)), ("B.car".to_string(), outcome(b_sales))]
            .into_iter()
            .collect(),
        shares: [("A".to_string(), 0.5), ("B".to_string(), 0.5)].into_iter().collect(),
        ..ProductionOption::default()
    }
}

#[test]
fn test_first_pass_spans_frontier() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let table = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap();

    assert_eq!(table.len(), 25);
    assert_eq!(levels_of(table.rows(), "A.car"), vec![100.0, 150.0, 200.0, 250.0, 300.0]);
    for row in table.rows() {
        assert_eq!(row.shares["A"], 0.5);
        assert_eq!(row.shares["B"], 0.5);
        assert!(row.abs_shares.is_empty());
        assert_eq!(row.tech["A.car"].cost_dollars, 11_000.0 - 5.0 * (row.tech["A.car"].co2e_gpmi - 100.0));
    }
}

#[test]
fn test_single_tech_option_uses_max_level() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = config(1);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let table = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].tech["A.car"].co2e_gpmi, 300.0);
}

#[test]
fn test_bev_option_count() {
    let f = fixture(false, FuelingClass::Bev);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let table = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap();
    assert_eq!(table.len(), 15);
    assert_eq!(levels_of(table.rows(), "B.car"), vec![100.0, 200.0, 300.0]);
}

#[test]
fn test_responsive_categories_are_partitioned() {
    let f = fixture(true, FuelingClass::Ice);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let table = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap();
    assert_eq!(table.len(), 125);
    for row in table.rows() {
        assert!((row.shares["A"] + row.shares["B"] - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_consumer_response_shares_are_inherited() {
    let f = fixture(true, FuelingClass::Ice);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();
    let response = ConsumerResponse {
        consumer_abs_shares: [("A".to_string(), 0.35)].into_iter().collect(),
        producer_abs_shares: [("A".to_string(), 0.5), ("B".to_string(), 0.65)]
            .into_iter()
            .collect(),
        total_sales: Some(900.0),
    };

    let table = generator
        .generate(
            &f.built.market_class_tree,
            &SweepRequest {
                consumer_response: Some(&response),
                ..first_pass(1.0)
            },
            &mut narrowing,
        )
        .unwrap();

    assert_eq!(table.len(), 25);
    for row in table.rows() {
        assert!(row.shares.is_empty());
        assert_eq!(row.abs_shares["A"], 0.35);
        assert_eq!(row.abs_shares["B"], 0.65);
    }
}

#[test]
fn test_missing_context_share_is_an_error() {
    let mut f = fixture(false, FuelingClass::Ice);
    f.context.category_shares.retain(|e| e.category != "B");
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let err = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap_err();
    assert_eq!(
        err,
        SearchError::MissingShare {
            category: "B".to_string()
        }
    );
}

#[test]
fn test_row_limit_enforced_before_materializing() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = SearchConfig {
        max_option_rows: 10,
        ..config(5)
    };
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();

    let err = generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap_err();
    assert_eq!(err, SearchError::OptionTableTooLarge { rows: 25, limit: 10 });
}

#[test]
fn test_sold_vehicle_window_narrows() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = SearchConfig {
        convergence_factor: 0.25,
        ..config(5)
    };
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();
    let candidates = CandidateDecision {
        options: vec![candidate(200.0, 500.0, 200.0, 0.0)],
        compliance_possible: true,
    };

    let table = generator
        .generate(
            &f.built.market_class_tree,
            &SweepRequest {
                candidates: Some(&candidates),
                ..first_pass(0.25)
            },
            &mut narrowing,
        )
        .unwrap();

    // Sold: window 200 × (1 ± 0.25)
    assert_eq!(levels_of(table.rows(), "A.car"), vec![150.0, 175.0, 200.0, 225.0, 250.0]);
    // Unsold: full window, clipped to the frontier
    assert_eq!(levels_of(table.rows(), "B.car"), vec![100.0, 150.0, 200.0, 250.0, 300.0]);
    assert_eq!(narrowing.count("A.car"), 1);
    assert_eq!(narrowing.count("B.car"), 0);
}

#[test]
fn test_missing_prior_level_is_an_error() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();
    let mut prior = candidate(200.0, 500.0, 200.0, 500.0);
    prior.tech.remove("B.car");
    let candidates = CandidateDecision {
        options: vec![prior],
        compliance_possible: false,
    };

    let err = generator
        .generate(
            &f.built.market_class_tree,
            &SweepRequest {
                candidates: Some(&candidates),
                ..first_pass(0.5)
            },
            &mut narrowing,
        )
        .unwrap_err();
    assert_eq!(
        err,
        SearchError::MissingVehicleColumn {
            vehicle_id: "B.car".to_string()
        }
    );
}

#[test]
fn test_narrowing_policies() {
    let mut n = TechNarrowing::new();
    assert_eq!(n.observe("v", false, NarrowingPolicy::SoldOrNarrowing), 0);
    assert_eq!(n.observe("v", true, NarrowingPolicy::SoldOrNarrowing), 1);
    assert_eq!(n.observe("v", false, NarrowingPolicy::SoldOrNarrowing), 2);
    assert_eq!(n.observe("v", false, NarrowingPolicy::SoldOnly), 2);
    assert_eq!(n.observe("w", false, NarrowingPolicy::Always), 1);

    n.reset();
    assert_eq!(n.count("v"), 0);
}

#[test]
fn test_fresh_search_resets_narrowing() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = config(5);
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();
    narrowing.observe("A.car", true, NarrowingPolicy::Always);

    generator
        .generate(&f.built.market_class_tree, &first_pass(1.0), &mut narrowing)
        .unwrap();
    assert_eq!(narrowing.count("A.car"), 0);

    let policy: NarrowingPolicy = serde_json::from_str("\"sold_only\"").unwrap();
    assert_eq!(policy, NarrowingPolicy::SoldOnly);
}

#[test]
fn test_tech_window_follows_convergence_factor_not_share_range() {
    let f = fixture(false, FuelingClass::Ice);
    let cfg = SearchConfig {
        convergence_factor: 0.25,
        ..config(5)
    };
    let generator = TechShareSweepGenerator::new(&cfg, &f.market_classes, &f.constraints, &f.context);
    let mut narrowing = TechNarrowing::new();
    let candidates = CandidateDecision {
        options: vec![candidate(200.0, 500.0, 200.0, 0.0)],
        compliance_possible: true,
    };

    let table = generator
        .generate(
            &f.built.market_class_tree,
            &SweepRequest {
                candidates: Some(&candidates),
                ..first_pass(0.5)
            },
            &mut narrowing,
        )
        .unwrap();

    // 200 × (1 ± 0.25^1), not 200 × (1 ± 0.5^1)
    assert_eq!(levels_of(table.rows(), "A.car"), vec![150.0, 175.0, 200.0, 225.0, 250.0]);
    assert_eq!(narrowing.count("A.car"), 1);
}
