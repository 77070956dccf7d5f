//! Ensembles of players addressed as one unit

use tracing::warn;

use crate::attr::Attr;
use crate::error::{OstinatoError, Result};
use crate::pattern::Pattern;
use crate::player::{Player, PlayerId};
use crate::stage::Stage;
use crate::value::{TimeVar, Value};

/// Fixed collection of player handles. Writes fan out to every member and
/// reads fan in as one value per member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    members: Vec<PlayerId>,
}

impl Group {
    pub fn new(members: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Set `attr` on every member. Members that fail are reported and skipped.
    pub fn set(&self, stage: &mut Stage, attr: Attr, pattern: impl Into<Pattern>) -> Vec<(PlayerId, OstinatoError)> {
        let pattern = pattern.into();
        self.each(stage, |player| {
            player.set(attr, pattern.clone());
            Ok(())
        })
    }

    /// Set an attribute by name on every member
    pub fn set_named(
        &self,
        stage: &mut Stage,
        name: &str,
        pattern: impl Into<Pattern>,
    ) -> Vec<(PlayerId, OstinatoError)> {
        let pattern = pattern.into();
        self.each(stage, |player| player.set_named(name, pattern.clone()).map(|_| ()))
    }

    /// Current resolved value of `attr` for each member, in member order
    pub fn get(&self, stage: &Stage, attr: Attr) -> Vec<Value> {
        self.members
            .iter()
            .map(|id| stage.value(*id, attr).unwrap_or(Value::Nil))
            .collect()
    }

    /// Apply `f` to every member, collecting per-member failures
    pub fn each(
        &self,
        stage: &mut Stage,
        mut f: impl FnMut(&mut Player) -> Result<()>,
    ) -> Vec<(PlayerId, OstinatoError)> {
        let mut failures = Vec::new();
        for id in &self.members {
            let result = stage.player_mut(*id).and_then(&mut f);
            if let Err(err) = result {
                warn!("group member {id}: {err}");
                failures.push((*id, err));
            }
        }
        failures
    }

    /// First member takes solo, the rest join it; `false` releases solo
    pub fn solo(&self, stage: &mut Stage, on: bool) -> Vec<(PlayerId, OstinatoError)> {
        let mut failures = Vec::new();
        let Some((first, rest)) = self.members.split_first() else {
            return failures;
        };
        if !on {
            if let Err(err) = stage.solo(*first, false) {
                failures.push((*first, err));
            }
            return failures;
        }
        if let Err(err) = stage.solo(*first, true) {
            failures.push((*first, err));
        }
        for id in rest {
            if let Err(err) = stage.solo_add(*id) {
                warn!("group member {id}: {err}");
                failures.push((*id, err));
            }
        }
        failures
    }

    pub fn stop(&self, stage: &mut Stage, bars: u32) -> Vec<(PlayerId, OstinatoError)> {
        self.fan_out(stage, |stage, id| stage.stop(id, bars))
    }

    pub fn kill(&self, stage: &mut Stage) -> Vec<(PlayerId, OstinatoError)> {
        self.fan_out(stage, |stage, id| stage.kill(id))
    }

    /// Fade members in one after another so the whole ensemble is covered
    /// once every `bars` bars.
    pub fn iterate(&self, stage: &mut Stage, bars: f64) -> Vec<(PlayerId, OstinatoError)> {
        if self.members.is_empty() {
            return Vec::new();
        }
        let total = bars * stage.bar_length();
        let on = total / self.members.len() as f64;
        let mut failures = Vec::new();
        for (i, id) in self.members.iter().enumerate() {
            let delay = i as f64 * on;
            let var = TimeVar::new(vec![0.0, 1.0, 0.0], vec![delay, on, total - delay - on]);
            if let Err(err) = stage.set_attr(*id, Attr::Amplify, var) {
                warn!("group member {id}: {err}");
                failures.push((*id, err));
            }
        }
        failures
    }

    fn fan_out(
        &self,
        stage: &mut Stage,
        mut f: impl FnMut(&mut Stage, PlayerId) -> Result<()>,
    ) -> Vec<(PlayerId, OstinatoError)> {
        let mut failures = Vec::new();
        for id in &self.members {
            if let Err(err) = f(stage, *id) {
                warn!("group member {id}: {err}");
                failures.push((*id, err));
            }
        }
        failures
    }
}

impl FromIterator<PlayerId> for Group {
    fn from_iter<I: IntoIterator<Item = PlayerId>>(iter: I) -> Self {
        Group::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::Assignment;
    use crate::config::StageConfig;
    use crate::message::MessageLog;
    use crate::player::PlaybackState;

    fn trio() -> (Stage, Group, MessageLog) {
        let log = MessageLog::new();
        let mut stage = Stage::new(StageConfig::default()).with_sink(log.clone());
        let ids: Vec<_> = (0..3).map(|_| stage.add_player()).collect();
        for (i, id) in ids.iter().enumerate() {
            stage
                .assign(*id, Assignment::pitched(format!("voice{i}")).degree(i as f64))
                .unwrap();
        }
        (stage, Group::new(ids), log)
    }

    #[test]
    fn test_set_fans_out_past_failures() {
        let (mut stage, group, _log) = trio();
        let mut members = group.members().to_vec();
        members.insert(1, PlayerId(42));
        let group = Group::new(members);

        let failures = group.set(&mut stage, Attr::Pan, [-1.0]);
        assert_eq!(failures, vec![(PlayerId(42), OstinatoError::PlayerNotFound(PlayerId(42)))]);
        for id in group.members().iter().filter(|id| **id != PlayerId(42)) {
            assert_eq!(stage.player(*id).unwrap().get(Attr::Pan), &Pattern::from([-1.0]));
        }
    }

    #[test]
    fn test_unknown_name_reported_per_member() {
        let (mut stage, group, _log) = trio();
        let failures = group.set_named(&mut stage, "wobble", 1.0);
        assert_eq!(failures.len(), 3);
        assert!(group.set_named(&mut stage, "room", 0.5).is_empty());
    }

    #[test]
    fn test_get_fans_in() {
        let (mut stage, group, _log) = trio();
        stage.advance_to(0.0);
        assert_eq!(
            group.get(&stage, Attr::Degree),
            vec![Value::Num(0.0), Value::Num(1.0), Value::Num(2.0)]
        );
    }

    #[test]
    fn test_solo_first_member_with_rest_joined() {
        let (mut stage, group, log) = trio();
        let outsider = stage.add_player();
        stage.assign(outsider, Assignment::pitched("outsider")).unwrap();

        assert!(group.solo(&mut stage, true).is_empty());
        stage.advance_to(0.0);
        assert_eq!(log.messages().len(), 3);
        assert!(log.messages().iter().all(|m| m.synth != "outsider"));

        group.solo(&mut stage, false);
        assert!(!stage.solo_register().is_active());
    }

    #[test]
    fn test_stop_and_kill_fan_out() {
        let (mut stage, group, _log) = trio();
        assert!(group.stop(&mut stage, 0).is_empty());
        for id in group.members() {
            assert_eq!(stage.player(*id).unwrap().state(), PlaybackState::Stopped);
        }
        assert!(group.kill(&mut stage).is_empty());
    }

    #[test]
    fn test_iterate_covers_bars_without_gaps() {
        let (mut stage, group, _log) = trio();
        assert!(group.iterate(&mut stage, 3.0).is_empty());

        let total = 3.0 * stage.bar_length();
        for (i, id) in group.members().iter().enumerate() {
            let Value::Var(var) = stage.player(*id).unwrap().get(Attr::Amplify).at(0) else {
                panic!("amplify should be time-varying");
            };
            let sum: f64 = var.durs.iter().sum();
            assert!((sum - total).abs() < 1e-9);
            assert_eq!(var.at(i as f64 * 4.0 + 1.0), 1.0);
        }

        // exactly one member sounds at any beat of the cycle
        for step in 0..24 {
            let beat = step as f64 * 0.5;
            let loud: Vec<_> = group
                .members()
                .iter()
                .filter_map(|id| match stage.player(*id).unwrap().get(Attr::Amplify).at(0) {
                    Value::Var(var) => Some(var.at(beat)),
                    _ => None,
                })
                .filter(|a| *a == 1.0)
                .collect();
            assert_eq!(loud.len(), 1, "beat {beat}");
        }
    }
}
