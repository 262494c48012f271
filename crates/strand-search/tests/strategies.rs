//! Search strategies against small target programs.

mod common;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use strand_search::{
    BreadthFirst, DfsSearch, HeuristicSearch, PreferThreadSwitch, RandomSearch, SearchConfig,
    SearchStrategy,
};
use strand_vm::{Program, VmConfig};

fn run(
    program: Program,
    config: SearchConfig,
    strategy: &mut dyn SearchStrategy,
) -> strand_search::SearchReport {
    common::core(program, config).run(strategy).unwrap()
}

#[test]
fn test_dfs_enumerates_single_worker_paths() {
    let report = run(
        common::single_worker(),
        common::all_paths(SearchConfig::default()),
        &mut DfsSearch::new(),
    );
    assert!(report.is_ok());
    assert_eq!(report.strategy, "dfs");
    assert_eq!(report.stats.paths, 3);
    assert_eq!(report.stats.end_states, 3);
}

#[test]
fn test_dfs_matches_plain_enumeration() {
    for program in [common::single_worker, common::sync_counter, common::nondet_pair] {
        let mut vm = common::started(program());
        let expected = common::count_paths(&mut vm);
        let report = run(
            program(),
            common::all_paths(SearchConfig::default()),
            &mut DfsSearch::new(),
        );
        assert_eq!(report.stats.paths, expected);
    }
}

#[test]
fn test_dfs_finds_lost_update() {
    let report = run(common::racy_counter(), SearchConfig::default(), &mut DfsSearch::new());
    assert_eq!(report.violations.len(), 1);
    let v = &report.violations[0];
    assert_eq!(v.property, "no-uncaught-exceptions");
    assert!(v.message.contains("java.lang.AssertionError"), "{}", v.message);
    assert!(v.message.contains("count == 2"), "{}", v.message);
    assert!(v.depth() > 2);
    assert_eq!(&*v.trail[0].cg_id, "root");
}

#[test]
fn test_synchronized_counter_is_correct() {
    let report = run(common::sync_counter(), SearchConfig::default(), &mut DfsSearch::new());
    assert!(report.is_ok(), "{:?}", report.violations);
    assert!(report.stats.end_states > 0);
}

#[test]
fn test_dfs_finds_deadlock() {
    let report = run(common::deadlock(), SearchConfig::default(), &mut DfsSearch::new());
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].property, "not-deadlocked");
}

#[test]
fn test_nondet_values_are_enumerated() {
    let report = run(
        common::nondet_pair(),
        common::all_paths(SearchConfig::default()),
        &mut DfsSearch::new(),
    );
    assert_eq!(report.stats.paths, 4);
    assert_eq!(report.stats.end_states, 3);
    assert_eq!(report.violations.len(), 1);
    let ids: Vec<&str> = report.violations[0]
        .trail
        .iter()
        .map(|r| &*r.cg_id)
        .filter(|id| id.starts_with("nondet"))
        .collect();
    assert_eq!(ids, vec!["nondet.randomInt", "nondet.randomInt"]);
}

#[test]
fn test_depth_limit_bounds_paths() {
    let config = SearchConfig {
        depth_limit: 2,
        ..common::all_paths(SearchConfig::default())
    };
    let report = run(common::racy_counter(), config, &mut DfsSearch::new());
    assert!(report.is_ok());
    assert!(report.stats.constraint_hits > 0);
    assert!(report.stats.max_depth <= 2);
}

#[test]
fn test_stop_on_first_error() {
    let keep_going = run(
        common::racy_counter(),
        common::all_paths(SearchConfig::default()),
        &mut DfsSearch::new(),
    );
    let stop = run(common::racy_counter(), SearchConfig::default(), &mut DfsSearch::new());
    assert_eq!(stop.violations.len(), 1);
    assert!(keep_going.violations.len() > 1);
    assert!(keep_going.stats.transitions > stop.stats.transitions);
}

#[test]
fn test_state_matching_prunes() {
    for program in [common::racy_counter, common::sync_counter, common::deadlock] {
        let exhaustive = run(
            program(),
            common::all_paths(SearchConfig::default()),
            &mut DfsSearch::new(),
        );
        let matched = run(
            program(),
            SearchConfig {
                state_matching: true,
                ..common::all_paths(SearchConfig::default())
            },
            &mut DfsSearch::new(),
        );
        assert!(matched.stats.new_states <= exhaustive.stats.new_states);
        assert!(matched.stats.transitions <= exhaustive.stats.transitions);
        assert_eq!(exhaustive.stats.revisited_states, 0);
        // Pruning never hides a kind of violation.
        assert_eq!(matched.violations.is_empty(), exhaustive.violations.is_empty());
    }
}

#[test]
fn test_state_matching_keeps_data_choices_behind_forced_breaks() {
    // Every step is a thread choice, so each nondeterministic call sits
    // right behind one that leaves heap and threads unchanged.
    let vm_config = VmConfig {
        max_transition_length: 1,
        ..VmConfig::default()
    };
    let run_with = |state_matching: bool| {
        let config = SearchConfig {
            state_matching,
            ..common::all_paths(SearchConfig::default())
        };
        common::core_with(common::nondet_pair(), vm_config.clone(), config)
            .run(&mut DfsSearch::new())
            .unwrap()
    };
    let exhaustive = run_with(false);
    let matched = run_with(true);
    assert_eq!(exhaustive.violations.len(), 1);
    assert_eq!(matched.violations.len(), 1);
    assert_eq!(matched.violations[0].trail, exhaustive.violations[0].trail);
    assert!(matched.stats.new_states <= exhaustive.stats.new_states);

    let report = run(
        common::nondet_pair(),
        SearchConfig::default(),
        &mut HeuristicSearch::new(BreadthFirst),
    );
    assert_eq!(report.violations.len(), 1);
}

#[test]
fn test_search_goes_on_after_a_violation() {
    let config = SearchConfig {
        seed: Some(3),
        ..common::all_paths(SearchConfig::default())
    };
    let report = run(common::two_escapes(), config.clone(), &mut RandomSearch::new());
    assert_eq!(report.stats.paths, 1);
    assert_eq!(report.stats.end_states, 1);
    let mut messages: Vec<&str> = report.violations.iter().map(|v| v.message.as_str()).collect();
    messages.sort_unstable();
    assert_eq!(
        messages,
        vec![
            "uncaught java.lang.AssertionError in T1: worker done",
            "uncaught java.lang.AssertionError in T2: worker done",
        ]
    );

    let dfs = run(common::two_escapes(), config, &mut DfsSearch::new());
    assert!(dfs.violations.iter().any(|v| v.message.contains("in T1")));
    assert!(dfs.violations.iter().any(|v| v.message.contains("in T2")));
    assert_eq!(dfs.stats.end_states, dfs.stats.paths);

    // Stopping at the first violation leaves the second one unseen.
    let stop = run(common::two_escapes(), SearchConfig::default(), &mut DfsSearch::new());
    assert_eq!(stop.violations.len(), 1);
}

#[test]
fn test_random_path_limit() {
    for (limit, paths) in [(0, 1), (4, 5)] {
        let config = SearchConfig {
            path_limit: limit,
            seed: Some(7),
            ..common::all_paths(SearchConfig::default())
        };
        let report = run(common::racy_counter(), config, &mut RandomSearch::new());
        assert_eq!(report.strategy, "random");
        assert_eq!(report.stats.paths, paths);
        assert_eq!(report.stats.restores, paths - 1);
    }
}

#[test]
fn test_random_depth_limit() {
    let config = SearchConfig {
        depth_limit: 1,
        path_limit: 2,
        seed: Some(1),
        ..SearchConfig::default()
    };
    let report = run(common::racy_counter(), config, &mut RandomSearch::new());
    assert_eq!(report.stats.paths, 3);
    assert_eq!(report.stats.constraint_hits, 3);
    assert_eq!(report.stats.max_depth, 1);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_search_is_reproducible(seed in any::<u64>(), limit in 0usize..6) {
        let config = SearchConfig {
            path_limit: limit,
            seed: Some(seed),
            ..common::all_paths(SearchConfig::default())
        };
        let a = run(common::racy_counter(), config.clone(), &mut RandomSearch::new());
        let b = run(common::racy_counter(), config, &mut RandomSearch::new());
        prop_assert_eq!(&a.stats, &b.stats);
        prop_assert_eq!(a.violations, b.violations);
        prop_assert_eq!(a.stats.paths, limit + 1);
    }
}

#[test]
fn test_breadth_first_covers_the_same_paths() {
    for program in [common::single_worker, common::nondet_pair] {
        let dfs = run(
            program(),
            common::all_paths(SearchConfig::default()),
            &mut DfsSearch::new(),
        );
        let bfs = run(
            program(),
            common::all_paths(SearchConfig::default()),
            &mut HeuristicSearch::new(BreadthFirst),
        );
        assert_eq!(bfs.stats.paths, dfs.stats.paths);
        assert_eq!(bfs.stats.end_states, dfs.stats.end_states);
        assert_eq!(bfs.violations.len(), dfs.violations.len());
    }
}

#[test]
fn test_heuristics_find_lost_update() {
    let bfs = run(
        common::racy_counter(),
        SearchConfig::default(),
        &mut HeuristicSearch::new(BreadthFirst),
    );
    assert_eq!(bfs.strategy, "bfs");
    assert_eq!(bfs.violations.len(), 1);

    let switch = run(
        common::racy_counter(),
        SearchConfig::default(),
        &mut HeuristicSearch::new(PreferThreadSwitch),
    );
    assert_eq!(switch.strategy, "switch");
    assert_eq!(switch.violations.len(), 1);
    assert!(switch.violations[0].message.contains("count == 2"));
}
