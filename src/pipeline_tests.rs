#[cfg(test)]
mod tests {
    use crate::cluster::{
        CenterRule, Cluster, ClustererConfig, Clustering, ClusteringResult, ConcurrentClusterer,
        RestartOrchestrator, RestartPolicy,
    };
    use crate::consensus::{ConsensusResolver, ConsensusTensor};
    use crate::metrics::ari;
    use crate::pipeline::{PipelineConfig, SubcompartmentPipeline};
    use crate::refine::{NeighborRefiner, RefineConfig};
    use crate::{FeatureMatrix, Result};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// 100 × 5 rows around three centers with ±0.5 uniform noise and one
    /// missing coordinate in roughly a quarter of the rows (5% of cells).
    fn three_groups(seed: u64) -> (FeatureMatrix, Vec<Option<usize>>) {
        let centers = [
            [0.0f32; 5],
            [10.0; 5],
            [-10.0, 10.0, -10.0, 10.0, -10.0],
        ];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::with_capacity(100);
        let mut truth = Vec::with_capacity(100);
        for i in 0..100 {
            let g = match i {
                0..=32 => 0,
                33..=65 => 1,
                _ => 2,
            };
            let mut row: Vec<f32> = centers[g]
                .iter()
                .map(|&c| c + rng.random_range(-0.5f32..0.5))
                .collect();
            if rng.random::<f64>() < 0.25 {
                let j = rng.random_range(0..5);
                row[j] = f32::NAN;
            }
            rows.push(row);
            truth.push(Some(g));
        }
        (FeatureMatrix::from_rows(&rows).unwrap(), truth)
    }

    fn quick_policy() -> RestartPolicy {
        RestartPolicy::default().with_min_valid_attempts(5)
    }

    #[test]
    fn test_single_run_recovers_three_groups() -> Result<()> {
        init_logging();
        let (data, truth) = three_groups(1);
        assert!(data.missing_fraction() > 0.0);

        let outcome = RestartOrchestrator::new(ConcurrentClusterer::new(3))
            .with_policy(quick_policy())
            .with_seed(11)
            .run(&data)?;

        assert_eq!(outcome.best.actual_clusters(), 3);
        assert!((ari(outcome.best.labels(), &truth) - 1.0).abs() < 1e-12);
        assert!(outcome.best.wcss() < 5.0, "wcss {}", outcome.best.wcss());
        assert!(outcome.best.labels().iter().all(Option::is_some));
        Ok(())
    }

    #[test]
    fn test_two_seed_consensus_matches_truth() -> Result<()> {
        init_logging();
        let (data, truth) = three_groups(2);
        let config = PipelineConfig::default()
            .with_restart(quick_policy())
            .with_seed(3);
        let output = SubcompartmentPipeline::new(config).run(&data, None, 3)?;

        assert_eq!(output.runs.len(), 2);
        assert!(output.fallback.is_none());
        let consensus = output.consensus.as_ref().unwrap();
        assert_eq!(consensus.assignment.unresolved_count(), 0);
        assert_eq!(output.refinement.refined, 0);
        assert!((ari(output.assignment().labels(), &truth) - 1.0).abs() < 1e-12);
        for a in &output.agreement {
            assert!((a.ari - 1.0).abs() < 1e-12);
            assert!((a.nmi - 1.0).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_identical_runs_give_diagonal_tensor() -> Result<()> {
        let (data, _) = three_groups(3);
        let clusterer = ConcurrentClusterer::new(3);
        let a = clusterer.fit(&data, 5)?;
        let b = clusterer.fit(&data, 5)?;
        assert_eq!(a.labels(), b.labels());

        let runs = [a, b];
        let tensor = ConsensusTensor::build(&runs, 3)?;
        assert!(tensor.is_diagonal());

        let consensus = ConsensusResolver::new(3).resolve(&runs)?;
        assert!(consensus.assignment.is_complete());
        assert!((ari(consensus.assignment.labels(), runs[0].labels()) - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_mixed_center_rules_reconcile() -> Result<()> {
        let (data, truth) = three_groups(4);
        let config = PipelineConfig::default()
            .with_clusterer(ClustererConfig::default().with_num_threads(2))
            .with_restart(quick_policy())
            .with_n_runs(1)
            .with_rules(vec![CenterRule::Mean, CenterRule::Median])
            .with_seed(9);
        let output = SubcompartmentPipeline::new(config).run(&data, None, 3)?;

        assert_eq!(output.runs.len(), 2);
        assert!(output.assignment().is_complete());
        assert!((ari(output.assignment().labels(), &truth) - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_refinement_fills_disputed_rows() -> Result<()> {
        init_logging();
        let (data, truth) = three_groups(5);
        let run = |labels: Vec<Option<usize>>| {
            let clusters = (0..3)
                .map(|c| Cluster {
                    center: vec![0.0; 5],
                    members: (0..labels.len())
                        .filter(|&i| labels[i] == Some(c))
                        .collect(),
                    inertia: 0.0,
                })
                .collect();
            ClusteringResult::new(3, clusters, labels, 1, true, vec![], 0)
        };

        // Second run disputes every tenth row.
        let mut disputed = truth.clone();
        for i in (0..100).step_by(10) {
            disputed[i] = truth[i].map(|g| (g + 1) % 3);
        }
        let consensus = ConsensusResolver::new(3).resolve(&[run(truth.clone()), run(disputed)])?;
        assert_eq!(consensus.assignment.unresolved_count(), 10);

        let report = NeighborRefiner::new(RefineConfig::default().with_percentile(0.05))
            .refine(&data, None, consensus.assignment)?;
        assert!(report.unresolved.is_empty());
        assert_eq!(report.refined, 10);
        assert!((ari(report.assignment.labels(), &truth) - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_secondary_features_keep_groups() -> Result<()> {
        let (data, truth) = three_groups(6);
        let (secondary, _) = three_groups(7);
        let config = PipelineConfig::default()
            .with_restart(quick_policy())
            .with_seed(1);
        let output = SubcompartmentPipeline::new(config).run(&data, Some(&secondary), 3)?;
        assert!(output.assignment().is_complete());
        assert!((ari(output.assignment().labels(), &truth) - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_sweep_skips_unreachable_k() -> Result<()> {
        init_logging();
        let (data, _) = three_groups(8);
        let policy = RestartPolicy::default()
            .with_max_inner_attempts(2)
            .with_max_outer_attempts(3)
            .with_min_valid_attempts(2);
        let config = PipelineConfig::default()
            .with_clusterer(ClustererConfig::default().with_num_threads(1))
            .with_restart(policy);
        // 30 clusters of at least 5 rows cannot fit in 100 rows.
        let sweep = SubcompartmentPipeline::new(config).sweep(&data, [2, 3, 30])?;

        assert_eq!(sweep.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert!(sweep[&3].best.wcss() < sweep[&2].best.wcss());
        Ok(())
    }

    #[test]
    fn test_hub_export_uses_minus_one() {
        let (data, _) = three_groups(9);
        let mut labels: Vec<Option<usize>> = vec![Some(0); data.nrows()];
        labels[4] = None;
        let hub = crate::HubAssignment::new(labels);
        let signed = hub.to_signed();
        assert_eq!(signed[4], -1);
        assert_eq!(signed.iter().filter(|&&l| l == -1).count(), 1);
    }
}
