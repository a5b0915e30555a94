//! End-to-end simulation properties: sampling distributions, forcing,
//! scenario counting and shard-merge equivalence.
use ccg_core::conference::tiebreak::standard_registry;
use ccg_core::conference::{Conference, ConferenceName};
use ccg_core::game::{Game, Matchup, Score, WinProbability};
use ccg_core::outcomes::ScenarioOutcomes;
use ccg_core::roll::Scripted;
use ccg_core::scenario::{ScenarioCondition, ShortNames};
use ccg_core::season::{SeasonSnapshot, Year};
use ccg_core::simulator::Simulator;
use ccg_core::team::{RollConstraints, TeamName, TeamView};
use ccg_core::Date;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

fn date(month: u32, day: u32) -> Date {
    Date::new(2024, month, day).unwrap()
}

fn played(date: Date, away: &str, home: &str, score: (u16, u16)) -> Game {
    Game::try_new(
        date,
        TeamName::from(away),
        TeamName::from(home),
        false,
        Some(Score::from(score)),
        None,
    )
    .unwrap()
}

fn upcoming(date: Date, away: &str, home: &str, p_away: f64) -> Game {
    Game::try_new(
        date,
        TeamName::from(away),
        TeamName::from(home),
        false,
        None,
        Some(WinProbability::try_new(p_away).unwrap()),
    )
    .unwrap()
}

fn binomial(n: u32, k: u32) -> f64 {
    (0..k).fold(1.0, |acc, i| {
        acc * f64::from(n - i) / f64::from(i + 1)
    })
}

#[test]
fn fair_coin_season_matches_the_binomial() {
    let games: Vec<Game> = (1..=12)
        .map(|day| upcoming(date(9, day), "A", &format!("O{day}"), 0.5))
        .collect();
    let season = SeasonSnapshot::try_new(Year(2024), vec![], games).unwrap();
    let team_a = TeamName::from("A");

    let iterations = 100_000u32;
    let mut rng = StdRng::seed_from_u64(2024);
    let mut total_wins = 0u64;
    let mut histogram = [0u64; 13];
    for _ in 0..iterations {
        let wins = season.roll(&mut rng).team(&team_a).unwrap().wins();
        total_wins += u64::from(wins);
        histogram[wins as usize] += 1;
    }

    let mean = total_wins as f64 / f64::from(iterations);
    assert!((mean - 6.0).abs() < 0.05, "mean wins {mean}");

    for (wins, count) in histogram.iter().enumerate() {
        let expected = binomial(12, wins as u32) / 4096.0;
        let actual = *count as f64 / f64::from(iterations);
        assert!(
            (actual - expected).abs() < 0.01,
            "P(wins = {wins}): {actual} vs {expected}"
        );
    }
}

#[test]
fn forced_winners_always_win_out() {
    let probabilities = [0.9, 0.6, 0.5, 0.3, 0.1];
    let mut games = vec![
        played(date(9, 1), "X", "O1", (1, 0)),
        played(date(9, 2), "X", "O2", (0, 1)),
    ];
    games.extend(
        probabilities
            .iter()
            .enumerate()
            .map(|(index, &p)| upcoming(date(10, index as u32 + 1), "X", &format!("R{index}"), p)),
    );
    let season = SeasonSnapshot::try_new(Year(2024), vec![], games).unwrap();
    let team_x = TeamName::from("X");
    let winners: BTreeSet<TeamName> = [team_x.clone()].into_iter().collect();

    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..30 {
        let rolled = season.roll_forced(&mut rng, &winners, &BTreeSet::new());
        assert_eq!(rolled.team(&team_x).unwrap().wins(), 1 + 5);
    }
}

#[test]
fn conditioned_roll_matches_the_subset_distribution() {
    let probabilities = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4];
    let games: Vec<Game> = probabilities
        .iter()
        .enumerate()
        .map(|(index, &p)| upcoming(date(10, index as u32 + 1), "X", &format!("O{index}"), p))
        .collect();
    let team = TeamView::new(TeamName::from("X"), games, None);
    let constraints = RollConstraints::exactly(4);

    // Theoretical distribution over which two games are lost.
    let mut expected: BTreeMap<(String, String), f64> = BTreeMap::new();
    let mut normaliser = 0.0;
    for i in 0..6 {
        for j in (i + 1)..6 {
            let mut mass = 1.0;
            for (k, &p) in probabilities.iter().enumerate() {
                mass *= if k == i || k == j { 1.0 - p } else { p };
            }
            expected.insert((format!("O{i}"), format!("O{j}")), mass);
            normaliser += mass;
        }
    }
    for mass in expected.values_mut() {
        *mass /= normaliser;
    }

    let iterations = 50_000u32;
    let mut rng = StdRng::seed_from_u64(44);
    let mut observed: BTreeMap<(String, String), u64> = BTreeMap::new();
    for _ in 0..iterations {
        let rolled = team.roll(&mut rng, &constraints).unwrap();
        assert_eq!(rolled.wins(), 4);
        let losses: Vec<String> = rolled
            .losses_against()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(losses.len(), 2);
        *observed
            .entry((losses[0].clone(), losses[1].clone()))
            .or_default() += 1;
    }

    for (pair, expected_mass) in &expected {
        let actual = observed.get(pair).copied().unwrap_or(0) as f64 / f64::from(iterations);
        assert!(
            (actual - expected_mass).abs() < 0.01,
            "{pair:?}: {actual} vs {expected_mass}"
        );
    }
}

#[test]
fn sharded_simulation_equals_a_single_stream() {
    let conference = Conference::try_new(
        ConferenceName::from("ZZ"),
        [TeamName::from("A"), TeamName::from("B")].into_iter().collect(),
        None,
        true,
    )
    .unwrap();
    let season = SeasonSnapshot::try_new(
        Year(2024),
        vec![conference],
        vec![upcoming(date(11, 30), "A", "B", 0.6)],
    )
    .unwrap();
    // One unplayed game and a never-tied two-team table: exactly one draw
    // per iteration, so a stream can be cut at iteration boundaries.
    let draws: Vec<f64> = (0..10).map(|i| f64::from(i) / 10.0 + 0.05).collect();

    let registry = standard_registry(season.conferences());
    let mut single = Simulator::new(
        season.clone(),
        registry.clone(),
        vec![],
        date(11, 1),
        date(12, 31),
    );
    single.simulate(10, &mut Scripted::new(draws.clone())).unwrap();

    let mut merged = Simulator::new(season, registry, vec![], date(11, 1), date(12, 31));
    let mut first = merged.shard();
    first.simulate(5, &mut Scripted::new(draws[..5].to_vec())).unwrap();
    let mut second = merged.shard();
    second.simulate(5, &mut Scripted::new(draws[5..].to_vec())).unwrap();
    merged.merge(first);
    merged.merge(second);

    assert_eq!(single.conference_outcomes(), merged.conference_outcomes());
    assert_eq!(single.week_outcomes(), merged.week_outcomes());
}

/// Six-team conference: BYU 8-0 with four remaining, KSU 7-0 with four
/// remaining, four opponents taking the losses.
fn contender_season() -> SeasonSnapshot {
    let names = ["BYU", "KSU", "A1", "A2", "A3", "A4"];
    let conference = Conference::try_new(
        ConferenceName::from("B12"),
        names.iter().map(|name| TeamName::from(*name)).collect(),
        None,
        true,
    )
    .unwrap();
    let mut games = Vec::new();
    let mut day = 1;
    for round in 0..2 {
        for opponent in ["A1", "A2", "A3", "A4"] {
            if round == 0 {
                games.push(played(date(9, day), "BYU", opponent, (1, 0)));
            } else {
                games.push(played(date(9, day), opponent, "BYU", (0, 1)));
            }
            day += 1;
        }
    }
    for opponent in ["A1", "A2", "A3", "A4"] {
        games.push(played(date(10, day - 8), "KSU", opponent, (1, 0)));
        day += 1;
    }
    for opponent in ["A1", "A2", "A3"] {
        games.push(played(date(10, day - 8), opponent, "KSU", (0, 1)));
        day += 1;
    }
    for (index, (opponent, p)) in [("A1", 0.7), ("A2", 0.6), ("A3", 0.55), ("A4", 0.5)]
        .into_iter()
        .enumerate()
    {
        games.push(upcoming(date(11, index as u32 + 1), "BYU", opponent, p));
    }
    for (index, (opponent, p)) in [("A1", 0.8), ("A2", 0.7), ("A3", 0.6), ("A4", 0.5)]
        .into_iter()
        .enumerate()
    {
        games.push(upcoming(date(11, index as u32 + 5), "KSU", opponent, p));
    }
    SeasonSnapshot::try_new(Year(2024), vec![conference], games).unwrap()
}

#[test]
fn scenario_tallies_match_a_manual_replay() {
    let season = contender_season();
    let names = ShortNames::default();
    let byu = TeamName::from("BYU");
    let ksu = TeamName::from("KSU");
    let scenario = ScenarioOutcomes::new(vec![
        ScenarioCondition::win_exactly(
            &season,
            &byu,
            11,
            BTreeSet::new(),
            BTreeSet::new(),
            &names,
        )
        .unwrap(),
        ScenarioCondition::win_out(&season, &ksu, &names).unwrap(),
    ]);

    let registry = standard_registry(season.conferences());
    let iterations = 10_000u64;
    let mut sim = Simulator::new(
        season.clone(),
        registry.clone(),
        vec![scenario],
        date(12, 1),
        date(12, 2),
    );
    let mut rng = StdRng::seed_from_u64(77);
    sim.simulate(iterations, &mut rng).unwrap();

    // Replay the identical stream and count by hand.
    let seeder = &registry[&ConferenceName::from("B12")];
    let mut rng = StdRng::seed_from_u64(77);
    let mut satisfying = 0u64;
    let mut byu_in_ccg = 0u64;
    for _ in 0..iterations {
        let rolled = season.roll(&mut rng);
        let view = rolled.conference(&ConferenceName::from("B12")).unwrap();
        let (seed_1, seed_2) = seeder.seed(&view, &mut rng).unwrap();
        let ccg = Matchup::new(seed_1, seed_2);
        let byu_wins = rolled.team(&byu).unwrap().wins();
        let ksu_wins = rolled.team(&ksu).unwrap().wins();
        if byu_wins == 11 && ksu_wins == 11 {
            satisfying += 1;
            if ccg.contains(&byu) {
                byu_in_ccg += 1;
            }
        }
    }

    let scenario = &sim.scenarios()[0];
    assert_eq!(scenario.total_seasons(), satisfying);
    assert!(satisfying > 0, "the scenario should occur in 10k rolls");
    let expected = byu_in_ccg as f64 / satisfying.max(1) as f64;
    assert!((scenario.prob_in_ccg(&byu) - expected).abs() < 1e-12);
}

#[test]
fn constrained_scenario_simulation_always_satisfies() {
    let season = contender_season();
    let names = ShortNames::default();
    let scenario = ScenarioOutcomes::new(vec![
        ScenarioCondition::win_exactly(
            &season,
            &TeamName::from("BYU"),
            11,
            BTreeSet::new(),
            BTreeSet::new(),
            &names,
        )
        .unwrap(),
        ScenarioCondition::win_out(&season, &TeamName::from("KSU"), &names).unwrap(),
    ]);
    let registry = standard_registry(season.conferences());
    let sim = Simulator::new(season, registry, vec![], date(12, 1), date(12, 2));
    let mut scenario = scenario;
    let mut rng = StdRng::seed_from_u64(13);
    sim.simulate_scenario(&mut scenario, 2_000, &mut rng).unwrap();
    assert_eq!(scenario.total_seasons(), 2_000);
    // BYU finishes 11-1 in every accepted season.
    let total: u64 = scenario.ccg_participants().values().sum();
    assert_eq!(total, 2_000);
}
