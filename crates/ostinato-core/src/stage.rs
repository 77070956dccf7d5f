//! The shared performance: player registry, scheduler and emission
//!
//! A `Stage` owns every player together with the clock, the solo register,
//! the sample bank and the outgoing sink. Hosts drive it by calling
//! [`Stage::advance_to`] with the current beat; every queued task at or
//! before that beat runs in time order, one queue block per instant, and
//! each block's messages are flushed to the sink as a single bundle.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::assignment::Assignment;
use crate::attr::Attr;
use crate::clock::{Clock, SoloRegister, TempoClock};
use crate::config::StageConfig;
use crate::error::{OstinatoError, Result};
use crate::event::Event;
use crate::key::{KeyExpr, Resolve};
use crate::message::{Bundle, ControlMessage, MessageSink, NullSink};
use crate::pattern::Pattern;
use crate::player::{count, PlaybackState, Player, PlayerId};
use crate::render::{render, RenderEnv};
use crate::samples::{SampleBank, SampleMap};
use crate::scheduler::{Block, Scheduler, Task, BEAT_EPSILON};
use crate::synth::SynthKind;
use crate::tuning::{EqualTemperament, Tuning};
use crate::value::{BinOp, Chord, Value};

/// Queue block being filled
struct OpenBlock {
    beat: f64,
    time: f64,
    /// Players due in this block that have not run yet
    pending: Vec<PlayerId>,
    messages: Vec<ControlMessage>,
}

pub struct Stage {
    config: StageConfig,
    players: HashMap<PlayerId, Player>,
    /// Most recent resolved event of every player that has ticked
    published: HashMap<PlayerId, Event>,
    next_id: u64,
    clock: Box<dyn Clock>,
    scheduler: Scheduler,
    solo: SoloRegister,
    bank: Box<dyn SampleBank>,
    tuning: Box<dyn Tuning>,
    sink: Box<dyn MessageSink>,
    now: f64,
    block: Option<OpenBlock>,
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        Self {
            clock: Box::new(TempoClock::new(config.bpm, config.beats_per_bar)),
            config,
            players: HashMap::new(),
            published: HashMap::new(),
            next_id: 1,
            scheduler: Scheduler::new(),
            solo: SoloRegister::default(),
            bank: Box::new(SampleMap::new()),
            tuning: Box::new(EqualTemperament),
            sink: Box::new(NullSink),
            now: 0.0,
            block: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_samples(mut self, bank: impl SampleBank + 'static) -> Self {
        self.bank = Box::new(bank);
        self
    }

    pub fn with_tuning(mut self, tuning: impl Tuning + 'static) -> Self {
        self.tuning = Box::new(tuning);
        self
    }

    pub fn with_sink(mut self, sink: impl MessageSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.sink = sink;
    }

    pub fn set_samples(&mut self, bank: Box<dyn SampleBank>) {
        self.bank = bank;
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn solo_register(&self) -> &SoloRegister {
        &self.solo
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn bpm(&self) -> f64 {
        self.clock.bpm()
    }

    /// Bar length in beats
    pub fn bar_length(&self) -> f64 {
        self.clock.beats_per_bar()
    }

    /// First bar boundary at or after now
    pub fn next_bar(&self) -> f64 {
        let bar = self.bar_length();
        if bar <= 0.0 {
            return self.now;
        }
        ((self.now / bar - BEAT_EPSILON).ceil() * bar).max(0.0)
    }

    /// Seconds spanned by `beats` at the current tempo
    pub fn beat_dur(&self, beats: f64) -> f64 {
        self.clock.beat_dur(beats)
    }

    pub fn add_player(&mut self) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        let mut player = Player::new(id);
        player.reset(self.config.root);
        self.players.insert(id, player);
        id
    }

    pub fn player(&self, id: PlayerId) -> Result<&Player> {
        self.players.get(&id).ok_or(OstinatoError::PlayerNotFound(id))
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player> {
        self.players.get_mut(&id).ok_or(OstinatoError::PlayerNotFound(id))
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn key(&self, id: PlayerId, attr: Attr) -> KeyExpr {
        KeyExpr::attr(id, attr)
    }

    pub fn set_attr(&mut self, id: PlayerId, attr: Attr, pattern: impl Into<Pattern>) -> Result<()> {
        self.player_mut(id)?.set(attr, pattern);
        Ok(())
    }

    /// Current resolved value of `attr` on `id`
    pub fn value(&self, id: PlayerId, attr: Attr) -> Result<Value> {
        if let Some(event) = self.published.get(&id) {
            return Ok(event.get(attr).clone());
        }
        let player = self.player(id)?;
        Ok(player.get(attr).at(player.event_n()))
    }

    /// Bind `id` to a synth and patterns, starting it at the next bar if idle
    pub fn assign(&mut self, id: PlayerId, assignment: Assignment) -> Result<()> {
        let mut player = self.players.remove(&id).ok_or(OstinatoError::PlayerNotFound(id))?;
        let result = self.apply_assignment(&mut player, assignment);
        self.players.insert(id, player);
        result
    }

    fn apply_assignment(&mut self, player: &mut Player, assignment: Assignment) -> Result<()> {
        let id = player.id();
        let was_idle = !player.is_playing();
        let sus_given = assignment.sets(Attr::Sus);
        let Assignment {
            synth,
            primary,
            scale,
            root,
            dur,
            overrides,
        } = assignment;

        player.synth = synth;
        if was_idle {
            player.reset(self.config.root);
        }

        if self.solo.is_active() && !self.solo.contains(id) {
            self.scheduler.schedule(self.next_bar(), Task::SoloAdd(id));
        }

        if let Some(primary) = primary {
            player.set(Attr::Degree, primary);
        }
        player.scale = scale.unwrap_or(self.config.scale);
        player.set(Attr::Root, root.unwrap_or_else(|| Pattern::single(self.config.root)));
        if let Some(dur) = dur {
            if !sus_given && player.synth.kind != SynthKind::Sample {
                player.set(Attr::Sus, dur.clone());
            }
            player.set(Attr::Dur, dur);
        }
        for (attr, pattern) in overrides {
            player.set(attr, pattern);
        }

        if was_idle {
            let start = self.next_bar();
            let rhythm = self.rhythm(player)?;
            self.align(player, rhythm, start, true)?;
            player.state = PlaybackState::Playing;
            player.stop_at = None;
            self.scheduler.schedule(player.event_time, Task::Player(id));
            info!(
                "{id} playing '{}' from {}",
                player.synth.name,
                self.clock.format_position(player.event_time)
            );
        }
        Ok(())
    }

    /// `stop(0)` stops now; otherwise the player runs on until `bars` bar
    /// boundaries have passed
    pub fn stop(&mut self, id: PlayerId, bars: u32) -> Result<()> {
        if bars == 0 {
            return self.with_player(id, |stage, player| stage.teardown(player, false));
        }
        let at = self.next_bar() + (bars - 1) as f64 * self.bar_length();
        let player = self.player_mut(id)?;
        if player.is_playing() {
            player.state = PlaybackState::StopPending;
            player.stop_at = Some(at);
            debug!("{id} stopping at beat {at}");
        }
        Ok(())
    }

    /// Stop immediately and reset every attribute
    pub fn kill(&mut self, id: PlayerId) -> Result<()> {
        self.with_player(id, |stage, player| stage.teardown(player, true))?;
        self.published.remove(&id);
        Ok(())
    }

    /// Keep time without emitting
    pub fn pause(&mut self, id: PlayerId) -> Result<()> {
        self.player_mut(id)?.paused = true;
        Ok(())
    }

    pub fn resume(&mut self, id: PlayerId) -> Result<()> {
        self.player_mut(id)?.paused = false;
        Ok(())
    }

    /// Grant `id` exclusive emission rights, or release exclusivity
    pub fn solo(&mut self, id: PlayerId, on: bool) -> Result<()> {
        self.player(id)?;
        if on {
            self.solo.set(id);
        } else {
            self.solo.reset();
        }
        Ok(())
    }

    /// Add `id` to the current solo set
    pub fn solo_add(&mut self, id: PlayerId) -> Result<()> {
        self.player(id)?;
        self.solo.add(id);
        Ok(())
    }

    /// Change tempo at the next bar boundary
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm <= 0.0 || !bpm.is_finite() {
            warn!("ignoring tempo {bpm}");
            return;
        }
        let at = self.next_bar();
        self.scheduler.schedule(at, Task::Tempo(bpm));
        debug!("tempo {bpm} from beat {at}");
    }

    /// Repeat the next note of `id` within its own duration
    pub fn stutter(&mut self, id: PlayerId, n: usize) -> Result<()> {
        self.player_mut(id)?.stutter(n);
        Ok(())
    }

    /// Run every task due at or before `beat`
    pub fn advance_to(&mut self, beat: f64) {
        while let Some(block) = self.scheduler.pop_block(beat) {
            self.run_block(block);
        }
        if beat > self.now {
            self.now = beat;
        }
    }

    fn run_block(&mut self, block: Block) {
        self.now = block.beat;

        let mut due = Vec::new();
        for task in block.tasks {
            match task {
                Task::Tempo(bpm) => {
                    self.clock.set_bpm(bpm, block.beat);
                    info!("tempo set to {bpm}");
                }
                Task::SoloAdd(id) => self.solo.add(id),
                Task::Player(id) => due.push(id),
            }
        }
        due.sort_by_key(|id| self.players.get(id).map_or(0, Player::num_key_references));

        self.block = Some(OpenBlock {
            beat: block.beat,
            time: self.clock.seconds_at(block.beat) + self.config.latency,
            pending: due.clone(),
            messages: Vec::new(),
        });

        for id in due {
            if self.take_pending(id) {
                self.invoke(id);
            }
        }

        let Some(open) = self.block.take() else {
            return;
        };
        if !open.messages.is_empty() {
            self.sink.send(Bundle {
                beat: open.beat,
                time: open.time,
                messages: open.messages,
            });
        }
    }

    fn take_pending(&mut self, id: PlayerId) -> bool {
        let Some(open) = self.block.as_mut() else {
            return false;
        };
        match open.pending.iter().position(|p| *p == id) {
            Some(i) => {
                open.pending.remove(i);
                true
            }
            None => false,
        }
    }

    fn with_player(&mut self, id: PlayerId, f: impl FnOnce(&mut Self, &mut Player)) -> Result<()> {
        let mut player = self.players.remove(&id).ok_or(OstinatoError::PlayerNotFound(id))?;
        f(self, &mut player);
        self.players.insert(id, player);
        Ok(())
    }

    fn invoke(&mut self, id: PlayerId) {
        if let Err(err) = self.with_player(id, |stage, player| stage.tick(player)) {
            debug!("skipping {id}: {err}");
        }
    }

    fn tick(&mut self, player: &mut Player) {
        let id = player.id();
        match player.state {
            PlaybackState::Stopped => return,
            PlaybackState::StopPending if player.stop_at.is_some_and(|at| self.now >= at - BEAT_EPSILON) => {
                self.teardown(player, false);
                return;
            }
            _ => {}
        }

        let rhythm = match self.rhythm(player) {
            Ok(rhythm) => rhythm,
            Err(err) => {
                warn!("{id}: {err}, stopping");
                self.teardown(player, false);
                return;
            }
        };
        if player.cached_rhythm.as_ref() != Some(&rhythm) {
            let at = player.event_time;
            if let Err(err) = self.align(player, rhythm, at, false) {
                warn!("{id}: {err}, stopping");
                self.teardown(player, false);
                return;
            }
        }

        self.reharmonise(player);

        let attempts = player.cached_rhythm.as_ref().map_or(1, Vec::len) + 1;
        let mut dur = 0.0;
        for attempt in 1..=attempts {
            player.event = self.resolve_event(player);
            dur = player.event.num(Attr::Dur).unwrap_or(0.0);
            if dur > 0.0 {
                break;
            }
            if attempt == attempts {
                warn!("{}", OstinatoError::ZeroDuration);
                player.set(Attr::Dur, 1.0);
                player.cached_rhythm = Some(vec![1.0]);
                player.event.set(Attr::Dur, Value::Num(1.0));
                dur = 1.0;
                break;
            }
            player.event_n += 1;
        }

        self.published.insert(id, player.event.clone());

        let is_rest = player.event.get(Attr::Dur).is_rest();
        if self.solo.allows(id) && !player.paused && !is_rest {
            self.emit(player, dur);
        } else {
            player.pending_stutter = 0;
        }

        if let Some(bpm) = player.event.num(Attr::Bpm).filter(|b| *b > 0.0) {
            let clock_bpm = self.clock.bpm();
            if (bpm - clock_bpm).abs() > BEAT_EPSILON {
                dur *= clock_bpm / bpm;
            }
        }

        player.event_time += dur;
        player.event_n += 1;
        player.notes_played += 1;
        self.scheduler.schedule(player.event_time, Task::Player(id));
    }

    fn emit(&mut self, player: &mut Player, dur: f64) {
        let Some(time) = self.block.as_ref().map(|b| b.time) else {
            return;
        };

        let mut event = player.event.clone();
        let repeats = std::mem::take(&mut player.pending_stutter);
        if repeats > 1 {
            let offsets = Chord::new((0..repeats).map(|i| i as f64 * dur / repeats as f64));
            let delay = Value::combine(BinOp::Add, event.get(Attr::Delay), &Value::Chord(offsets));
            event.set(Attr::Delay, delay);
        }

        let env = RenderEnv {
            synth: &player.synth,
            scale: player.scale,
            clock: self.clock.as_ref(),
            tuning: self.tuning.as_ref(),
            bank: self.bank.as_ref(),
            time,
        };
        let rendered = render(&env, &event, &mut player.last_pitch);

        player.freqs = rendered.freqs;
        player.bufs = rendered.bufs;
        if rendered.messages.is_empty() {
            return;
        }
        if let Some(hook) = &player.bang {
            hook(player.id(), &event);
        }
        if let Some(open) = self.block.as_mut() {
            open.messages.extend(rendered.messages);
        }
    }

    fn teardown(&mut self, player: &mut Player, reset: bool) {
        let id = player.id();
        player.state = PlaybackState::Stopped;
        player.stop_at = None;
        player.cached_rhythm = None;
        self.scheduler.cancel(id);
        self.solo.remove(id);
        if reset {
            player.reset(self.config.root);
        }
        info!("{id} stopped");
    }

    /// Materialise the duration stream for this tick
    fn rhythm(&mut self, player: &Player) -> Result<Vec<f64>> {
        player
            .get(Attr::Dur)
            .iter()
            .map(|raw| {
                let value = if raw.is_deferred() { raw.resolve(&mut *self)? } else { raw.clone() };
                match value {
                    Value::Nil => Ok(0.0),
                    other => other
                        .as_f64()
                        .ok_or_else(|| OstinatoError::NonNumericDuration(other.to_string())),
                }
            })
            .collect()
    }

    /// Place the cursor on `rhythm` at `time`, coercing a zero-total rhythm to one beat
    fn align(&mut self, player: &mut Player, rhythm: Vec<f64>, time: f64, find_after: bool) -> Result<()> {
        let (n, acc, rhythm) = match count(&rhythm, time, find_after) {
            Ok((n, acc)) => (n, acc, rhythm),
            Err(OstinatoError::ZeroDuration) => {
                warn!("{}: {}, set to 1", player.id(), OstinatoError::ZeroDuration);
                player.set(Attr::Dur, 1.0);
                let (n, acc) = count(&[1.0], time, find_after)?;
                (n, acc, vec![1.0])
            }
            Err(err) => return Err(err),
        };
        player.event_n = n;
        player.event_time = acc;
        player.cached_rhythm = Some(rhythm);
        Ok(())
    }

    fn resolve_event(&mut self, player: &Player) -> Event {
        let mut event = Event::new();
        for (attr, pattern) in player.attrs() {
            let raw = pattern.at(player.event_n);
            let value = if raw.is_deferred() {
                raw.resolve(&mut *self).unwrap_or_else(|err| {
                    warn!("{}.{attr}: {err}", player.id());
                    Value::Nil
                })
            } else {
                raw
            };
            event.set(attr, value);
        }
        event.apply_behaviour(|attr| player.event_n.div_euclid(player.get(attr).len().max(1) as i64));
        event
    }

    fn reharmonise(&mut self, player: &mut Player) {
        let Some(lead) = player.accompany.as_ref().map(|a| a.lead) else {
            return;
        };
        match self.peer_value(lead, Attr::Degree) {
            Some(Value::Nil) | None => {}
            Some(degree) => {
                if player.reharmonise(degree) {
                    debug!("{} re-harmonised around {lead}", player.id());
                }
            }
        }
    }
}

impl Resolve for Stage {
    fn now(&self) -> f64 {
        self.now
    }

    /// Peers due in the open block are resolved first so every reader sees
    /// this instant's value.
    fn peer_value(&mut self, player: PlayerId, attr: Attr) -> Option<Value> {
        if self.take_pending(player) {
            debug!("resolving {player} early for a peer");
            self.invoke(player);
        }
        if let Some(event) = self.published.get(&player) {
            return Some(event.get(attr).clone());
        }
        let peer = self.players.get(&player)?;
        let value = peer.get(attr).at(peer.event_n());
        Some(if value.is_deferred() { Value::Nil } else { value })
    }

    fn max_depth(&self) -> usize {
        self.config.max_reference_depth
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::message::MessageLog;
    use crate::rest::Rest;

    fn stage() -> (Stage, MessageLog) {
        let log = MessageLog::new();
        let stage = Stage::new(StageConfig::default())
            .with_samples(SampleMap::new().with('x', 1, 1).with('o', 2, 2))
            .with_sink(log.clone());
        (stage, log)
    }

    fn midinotes(log: &MessageLog) -> Vec<f64> {
        log.messages()
            .iter()
            .map(|m| m.field("midinote").unwrap().round())
            .collect()
    }

    #[test]
    fn test_pitched_scenario() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage
            .assign(a, Assignment::pitched("pluck").degree([0.0, 2.0, 4.0, 7.0]).dur([1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(stage.player(a).unwrap().event_time(), 0.0);

        stage.advance_to(0.0);
        let first = log.messages();
        assert_eq!(first.len(), 1);
        assert!((first[0].field("freq").unwrap() - 261.6255653).abs() < 1e-6);
        assert_eq!(stage.scheduler().next_beat(), Some(1.0));

        stage.advance_to(4.0);
        assert_eq!(midinotes(&log), vec![60.0, 64.0, 67.0, 72.0, 60.0]);
        let beats: Vec<f64> = log.bundles().iter().map(|b| b.beat).collect();
        assert_eq!(beats, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!((log.bundles()[1].time - 0.7).abs() < 1e-9);
        assert_eq!(first[0].field("sus"), Some(0.5));
    }

    #[test]
    fn test_activation_waits_for_next_bar() {
        let (mut stage, _log) = stage();
        stage.advance_to(1.5);
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").degree([0.0])).unwrap();
        assert_eq!(stage.player(a).unwrap().event_time(), 4.0);
        assert_eq!(stage.player(a).unwrap().event_n(), 4);
    }

    #[test]
    fn test_sample_scenario() {
        let (mut stage, log) = stage();
        let d = stage.add_player();
        stage.assign(d, Assignment::sample("x-o-").unwrap()).unwrap();
        stage.advance_to(1.5);

        let bufs: Vec<f64> = log.messages().iter().map(|m| m.field("buf").unwrap()).collect();
        assert_eq!(bufs, vec![1.0, 2.0]);
        assert_eq!(log.messages()[1].synth, "play2");
        assert_eq!(stage.player(d).unwrap().event_n(), 4);
        assert_eq!(stage.player(d).unwrap().event_time(), 2.0);
    }

    #[test]
    fn test_rest_selector_silent_even_when_bank_maps_it() {
        let log = MessageLog::new();
        let mut stage = Stage::new(StageConfig::default())
            .with_samples(SampleMap::new().with('x', 1, 1).with('o', 2, 2).with('-', 3, 1))
            .with_sink(log.clone());
        let d = stage.add_player();
        stage.assign(d, Assignment::sample("x-o-").unwrap()).unwrap();
        stage.advance_to(1.5);

        let bufs: Vec<f64> = log.messages().iter().map(|m| m.field("buf").unwrap()).collect();
        assert_eq!(bufs, vec![1.0, 2.0]);
    }

    #[test]
    fn test_loop_player_sends_buffer_and_position() {
        let (mut stage, log) = stage();
        let l = stage.add_player();
        stage.assign(l, Assignment::looper(3).degree([0.0, 4.0]).dur(4.0)).unwrap();
        stage.advance_to(6.0);

        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        for m in &messages {
            assert_eq!(m.synth, "loop");
            assert_eq!(m.field("buf"), Some(3.0));
        }
        let positions: Vec<f64> = messages.iter().map(|m| m.field("pos").unwrap()).collect();
        assert_eq!(positions, vec![0.0, 2.0]);
    }

    #[test]
    fn test_zero_amp_still_keeps_time() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").set(Attr::Amp, 0.0)).unwrap();
        stage.advance_to(3.0);
        assert!(log.messages().is_empty());
        assert_eq!(stage.player(a).unwrap().event_n(), 4);
    }

    #[test]
    fn test_zero_total_duration_does_not_hang() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").dur([0.0, 0.0])).unwrap();
        assert_eq!(stage.player(a).unwrap().get(Attr::Dur), &Pattern::from(1.0));
        stage.advance_to(3.0);
        assert_eq!(log.bundles().len(), 4);
    }

    #[test]
    fn test_zero_durations_are_skipped() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage
            .assign(a, Assignment::pitched("pluck").degree([0.0, 1.0, 2.0]).dur([1.0, 0.0, 1.0]))
            .unwrap();
        stage.advance_to(1.0);
        assert_eq!(midinotes(&log), vec![60.0, 64.0]);
    }

    #[test]
    fn test_rests_consume_time_silently() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        let dur = Pattern::new(vec![Value::Num(1.0), Value::Rest(Rest(1.0))]);
        stage.assign(a, Assignment::pitched("pluck").dur(dur)).unwrap();
        stage.advance_to(3.5);
        let beats: Vec<f64> = log.bundles().iter().map(|b| b.beat).collect();
        assert_eq!(beats, vec![0.0, 2.0]);
        assert_eq!(stage.player(a).unwrap().event_time(), 4.0);
    }

    #[test]
    fn test_solo_mutes_others_but_they_keep_time() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        let b = stage.add_player();
        stage.assign(a, Assignment::pitched("lead")).unwrap();
        stage.assign(b, Assignment::pitched("bass")).unwrap();
        stage.solo(a, true).unwrap();
        stage.advance_to(3.0);

        assert!(log.messages().iter().all(|m| m.synth == "lead"));
        assert_eq!(log.messages().len(), 4);
        assert_eq!(stage.player(b).unwrap().event_n(), 4);

        stage.solo(a, false).unwrap();
        log.clear();
        stage.advance_to(4.0);
        assert_eq!(log.messages().len(), 2);
    }

    #[test]
    fn test_late_player_joins_solo_at_next_bar() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("lead")).unwrap();
        stage.solo(a, true).unwrap();
        stage.advance_to(1.0);

        let b = stage.add_player();
        stage.assign(b, Assignment::pitched("late")).unwrap();
        stage.advance_to(4.0);
        let late: Vec<f64> = log
            .bundles()
            .iter()
            .filter(|bundle| bundle.messages.iter().any(|m| m.synth == "late"))
            .map(|bundle| bundle.beat)
            .collect();
        assert_eq!(late, vec![4.0]);
        assert!(stage.solo_register().contains(b));
    }

    #[test]
    fn test_follow_reads_lead_each_tick() {
        let (mut stage, _log) = stage();
        let follower = stage.add_player();
        let lead = stage.add_player();
        stage.assign(lead, Assignment::pitched("lead").degree([0.0, 2.0, 4.0])).unwrap();
        stage.assign(follower, Assignment::pitched("pad")).unwrap();
        stage.player_mut(follower).unwrap().follow(lead);

        for beat in 0..6 {
            stage.advance_to(beat as f64);
            assert_eq!(
                stage.value(follower, Attr::Degree).unwrap(),
                stage.value(lead, Attr::Degree).unwrap(),
                "beat {beat}"
            );
        }
    }

    #[test]
    fn test_follow_keeps_modifier() {
        let (mut stage, _log) = stage();
        let follower = stage.add_player();
        let lead = stage.add_player();
        stage.assign(lead, Assignment::pitched("lead").degree([0.0, 2.0, 4.0])).unwrap();
        stage.assign(follower, Assignment::pitched("pad")).unwrap();
        stage.player_mut(follower).unwrap().follow(lead).add(2.0);

        for beat in 0..3 {
            stage.advance_to(beat as f64);
            let lead_degree = stage.value(lead, Attr::Degree).unwrap().as_f64().unwrap();
            assert_eq!(
                stage.value(follower, Attr::Degree).unwrap(),
                Value::Num(lead_degree + 2.0),
                "beat {beat}"
            );
        }
    }

    #[test]
    fn test_peer_due_in_same_block_is_resolved_first() {
        let (mut stage, log) = stage();
        let reader = stage.add_player();
        let lead = stage.add_player();
        let key = stage.key(lead, Attr::Degree);
        stage.assign(reader, Assignment::pitched("reader").degree(key)).unwrap();
        stage.assign(lead, Assignment::pitched("lead").degree([0.0, 2.0, 4.0])).unwrap();

        stage.advance_to(2.0);
        let reader_notes: Vec<f64> = log
            .messages()
            .iter()
            .filter(|m| m.synth == "reader")
            .map(|m| m.field("midinote").unwrap().round())
            .collect();
        assert_eq!(reader_notes, vec![60.0, 64.0, 67.0]);
        assert_eq!(stage.player(lead).unwrap().event_n(), 3);
    }

    #[test]
    fn test_modifier_applies_while_playing() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").degree([0.0])).unwrap();
        stage.player_mut(a).unwrap().add(2.0).sub(1.0);
        stage.advance_to(0.0);
        assert_eq!(stage.value(a, Attr::Degree).unwrap(), Value::Num(1.0));
        assert_eq!(midinotes(&log), vec![62.0]);
    }

    #[test]
    fn test_accompany_tracks_lead_changes() {
        let (mut stage, _log) = stage();
        let lead = stage.add_player();
        let pad = stage.add_player();
        stage.assign(lead, Assignment::pitched("lead").degree([0.0, 0.0, 3.0]).dur(2.0)).unwrap();
        stage.assign(pad, Assignment::pitched("pad").dur(1.0)).unwrap();
        stage.player_mut(pad).unwrap().accompany(lead, [0.0, 2.0, 4.0]);

        stage.advance_to(0.0);
        assert_eq!(stage.value(pad, Attr::Degree).unwrap(), Value::Num(0.0));
        stage.advance_to(1.0);
        assert_eq!(stage.value(pad, Attr::Degree).unwrap(), Value::Num(2.0));
        stage.advance_to(4.0);
        assert_eq!(stage.player(pad).unwrap().get(Attr::Degree), &Pattern::from([3.0, 5.0, 7.0]));
    }

    #[test]
    fn test_stop_after_bars() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        stage.advance_to(0.5);
        stage.stop(a, 1).unwrap();
        assert_eq!(stage.player(a).unwrap().state(), PlaybackState::StopPending);
        assert_eq!(stage.player(a).unwrap().stop_at(), Some(4.0));

        stage.advance_to(8.0);
        assert_eq!(log.bundles().len(), 4);
        assert_eq!(stage.player(a).unwrap().state(), PlaybackState::Stopped);
        assert!(stage.scheduler().is_empty());
    }

    #[test]
    fn test_kill_resets_and_unschedules() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").set(Attr::Room, 0.5)).unwrap();
        stage.stop(a, 2).unwrap();
        stage.kill(a).unwrap();
        let player = stage.player(a).unwrap();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.get(Attr::Room), &Pattern::from(0.0));
        assert!(stage.scheduler().is_empty());
        stage.advance_to(4.0);
        assert!(log.messages().is_empty());
    }

    #[test]
    fn test_reassigning_idle_player_resets_attributes() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").set(Attr::Echo, 0.5)).unwrap();
        stage.stop(a, 0).unwrap();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        assert_eq!(stage.player(a).unwrap().get(Attr::Echo), &Pattern::from(0.0));
    }

    #[test]
    fn test_dur_defaults_sus_for_pitched_only() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").dur([0.5, 0.25])).unwrap();
        assert_eq!(stage.player(a).unwrap().get(Attr::Sus), &Pattern::from([0.5, 0.25]));

        let b = stage.add_player();
        stage.assign(b, Assignment::sample("x").unwrap().dur(0.25)).unwrap();
        assert_eq!(stage.player(b).unwrap().get(Attr::Sus), &Pattern::from(1.0));
    }

    #[test]
    fn test_rhythm_change_realigns_cursor() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").degree([0.0, 1.0, 2.0, 3.0])).unwrap();
        stage.advance_to(2.0);
        stage.set_attr(a, Attr::Dur, [0.5]).unwrap();
        stage.advance_to(3.0);
        let player = stage.player(a).unwrap();
        assert_eq!(player.event_n(), 7);
        assert_eq!(player.event_time(), 3.5);
    }

    #[test]
    fn test_non_numeric_duration_stops_player() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        stage.set_attr(a, Attr::Dur, Pattern::single('x')).unwrap();
        stage.advance_to(1.0);
        assert_eq!(stage.player(a).unwrap().state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_tempo_change_at_next_bar() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        stage.advance_to(1.0);
        stage.set_bpm(60.0);
        stage.advance_to(5.0);
        assert_eq!(stage.bpm(), 60.0);
        let times: Vec<f64> = log.bundles().iter().map(|b| b.time).collect();
        assert!((times[4] - 2.2).abs() < 1e-9);
        assert!((times[5] - 3.2).abs() < 1e-9);
        assert_eq!(log.messages()[5].field("sus"), Some(1.0));
    }

    #[test]
    fn test_custom_bpm_scales_advance() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck").set(Attr::Bpm, 60.0)).unwrap();
        stage.advance_to(4.0);
        let beats: Vec<f64> = log.bundles().iter().map(|b| b.beat).collect();
        assert_eq!(beats, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_pause_keeps_time() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        stage.pause(a).unwrap();
        stage.advance_to(1.0);
        assert!(log.messages().is_empty());
        stage.resume(a).unwrap();
        stage.advance_to(2.0);
        assert_eq!(log.messages().len(), 1);
        assert_eq!(stage.player(a).unwrap().event_n(), 3);
    }

    #[test]
    fn test_stutter_repeats_next_note() {
        let (mut stage, log) = stage();
        let a = stage.add_player();
        stage.assign(a, Assignment::pitched("pluck")).unwrap();
        stage.stutter(a, 4).unwrap();
        stage.advance_to(1.0);
        let times: Vec<f64> = log.messages().iter().map(|m| m.timestamp).collect();
        assert_eq!(times.len(), 5);
        assert!((times[3] - (0.2 + 0.375)).abs() < 1e-9);
    }

    #[test]
    fn test_bang_fires_once_per_event() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        stage
            .assign(a, Assignment::pitched("pluck").degree(Pattern::single(Chord::new([0.0, 2.0, 4.0]))))
            .unwrap();
        let bangs = Arc::new(AtomicUsize::new(0));
        let counter = bangs.clone();
        stage.player_mut(a).unwrap().on_bang(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        stage.advance_to(1.0);
        assert_eq!(bangs.load(Ordering::SeqCst), 2);
        assert_eq!(stage.player(a).unwrap().freqs().len(), 3);
    }

    #[test]
    fn test_cross_reference_cycle_terminates() {
        let (mut stage, _log) = stage();
        let a = stage.add_player();
        let b = stage.add_player();
        let ka = stage.key(a, Attr::Degree);
        let kb = stage.key(b, Attr::Degree);
        stage.assign(a, Assignment::pitched("a").degree(kb)).unwrap();
        stage.assign(b, Assignment::pitched("b").degree(ka)).unwrap();
        stage.advance_to(2.0);
        assert_eq!(stage.player(a).unwrap().event_n(), 3);
        assert_eq!(stage.player(b).unwrap().event_n(), 3);
    }

    #[test]
    fn test_unknown_player_reported() {
        let (mut stage, _log) = stage();
        assert_eq!(
            stage.assign(PlayerId(99), Assignment::pitched("x")),
            Err(OstinatoError::PlayerNotFound(PlayerId(99)))
        );
    }
}
