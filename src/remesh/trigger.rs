//! When to remesh

use super::RemeshCondition;

/// Decide whether the remesher fires after this timestep.
///
/// # Arguments
/// * `condition` - Configured trigger policy
/// * `timestep` - Index of the step that just completed
/// * `min_length_scale` - Current global minimum length scale L
/// * `init_min_length_scale` - Global minimum length scale of the initial mesh L0
///
/// # Returns
/// `false` on timesteps 0 and 1 regardless of the policy.
pub fn should_remesh(condition: RemeshCondition, timestep: u64, min_length_scale: f64, init_min_length_scale: f64) -> bool {
    if timestep <= 1 {
        return false;
    }
    let on_interval = |n: u64| n > 0 && timestep % n == 0;
    let on_shrink = |ratio: f64| init_min_length_scale > 0.0 && min_length_scale / init_min_length_scale < ratio;
    match condition {
        RemeshCondition::Off => false,
        RemeshCondition::OnTimestep(n) => on_interval(n),
        RemeshCondition::OnMinLengthScale(ratio) => on_shrink(ratio),
        RemeshCondition::OnBoth { interval, ratio } => on_interval(interval) || on_shrink(ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval() {
        let c = RemeshCondition::OnTimestep(5);
        assert!(!should_remesh(c, 4, 1.0, 1.0));
        assert!(should_remesh(c, 5, 1.0, 1.0));
        assert!(should_remesh(c, 10, 1.0, 1.0));
    }

    #[test]
    fn test_never_on_first_steps() {
        let c = RemeshCondition::OnTimestep(1);
        assert!(!should_remesh(c, 0, 1.0, 1.0));
        assert!(!should_remesh(c, 1, 1.0, 1.0));
        assert!(should_remesh(c, 2, 1.0, 1.0));
        assert!(!should_remesh(RemeshCondition::OnMinLengthScale(0.5), 1, 0.1, 1.0));
    }

    #[test]
    fn test_length_ratio() {
        let c = RemeshCondition::OnMinLengthScale(0.5);
        assert!(!should_remesh(c, 7, 0.6, 1.0));
        assert!(should_remesh(c, 7, 0.4, 1.0));
        assert!(!should_remesh(c, 7, 0.4, 0.0));
    }

    #[test]
    fn test_both_and_off() {
        let c = RemeshCondition::OnBoth { interval: 100, ratio: 0.5 };
        assert!(should_remesh(c, 100, 1.0, 1.0));
        assert!(should_remesh(c, 3, 0.2, 1.0));
        assert!(!should_remesh(c, 3, 0.9, 1.0));
        assert!(!should_remesh(RemeshCondition::Off, 100, 0.0, 1.0));
        assert!(!should_remesh(RemeshCondition::OnTimestep(0), 100, 1.0, 1.0));
    }
}
