//! Turning a resolved event into control messages

use std::collections::BTreeMap;

use tracing::warn;

use crate::attr::Attr;
use crate::clock::Clock;
use crate::error::OstinatoError;
use crate::event::Event;
use crate::fx::EFFECTS;
use crate::message::{ControlMessage, EffectGroup};
use crate::samples::{is_rest_selector, SampleBank};
use crate::synth::{SynthDef, SynthKind};
use crate::tuning::{ScaleMode, Tuning};
use crate::value::Value;

/// Collaborators needed to render one event
pub struct RenderEnv<'a> {
    pub synth: &'a SynthDef,
    pub scale: ScaleMode,
    pub clock: &'a dyn Clock,
    pub tuning: &'a dyn Tuning,
    pub bank: &'a dyn SampleBank,
    /// Block time in seconds
    pub time: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub messages: Vec<ControlMessage>,
    pub freqs: Vec<f64>,
    pub bufs: Vec<u32>,
}

type Layer = (BTreeMap<String, f64>, Vec<EffectGroup>, f64);

/// Render every layer of `event`. `last_pitch` carries the most recent good
/// MIDI note so an invalid degree replays it instead of failing the event.
pub fn render(env: &RenderEnv<'_>, event: &Event, last_pitch: &mut Option<f64>) -> Rendered {
    let mut out = Rendered::default();
    let mut seen: Vec<Layer> = Vec::new();

    for i in 0..event.layers() {
        let Some(mut fields) = base_fields(env, event, i, last_pitch) else {
            continue;
        };

        for attr in Attr::ALL.iter().copied().filter(Attr::is_sent) {
            let Some(value) = event.layer(attr, i).as_f64() else {
                continue;
            };
            let value = match attr {
                Attr::Sus => value * env.clock.beat_dur(1.0) * event.layer(Attr::Blur, i).as_f64().unwrap_or(1.0),
                Attr::Amp => value * event.layer(Attr::Amplify, i).as_f64().unwrap_or(1.0),
                _ => value,
            };
            if value != 0.0 || matches!(attr, Attr::Sus | Attr::Amp) {
                fields.insert(attr.name().to_string(), value);
            }
        }

        if fields.get("amp").copied().unwrap_or(0.0) <= 0.0 {
            continue;
        }
        let buf = fields.get("buf").copied().unwrap_or(0.0) as u32;
        if env.synth.kind == SynthKind::Sample && buf == 0 {
            continue;
        }

        let effects = effect_groups(event, i, &fields);
        let delay = event.layer(Attr::Delay, i).as_f64().unwrap_or(0.0);

        let layer = (fields, effects, delay);
        if seen.contains(&layer) {
            continue;
        }
        seen.push(layer.clone());
        let (fields, effects, delay) = layer;

        if let Some(freq) = fields.get("freq") {
            out.freqs.push(*freq);
        }
        if env.synth.kind != SynthKind::Pitched {
            out.bufs.push(buf);
        }

        let synth = env.synth.name_for(env.bank.channels(buf));
        out.messages.push(ControlMessage {
            synth,
            fields,
            effects,
            timestamp: env.time + env.clock.beat_dur(delay),
        });
    }

    out
}

fn base_fields(
    env: &RenderEnv<'_>,
    event: &Event,
    i: usize,
    last_pitch: &mut Option<f64>,
) -> Option<BTreeMap<String, f64>> {
    let mut fields = BTreeMap::new();
    let degree = event.layer(Attr::Degree, i);

    match env.synth.kind {
        SynthKind::Pitched => {
            let fixed = event.layer(Attr::Freq, i).as_f64().filter(|f| *f > 0.0);
            let freq = if let Some(freq) = fixed {
                freq
            } else if env.scale == ScaleMode::Freq {
                degree.as_f64()?
            } else {
                let root = event.layer(Attr::Root, i).as_f64().unwrap_or(0.0);
                let octave = event.layer(Attr::Oct, i);
                let midi = match env.tuning.midi(env.scale, &octave, &degree, root) {
                    Ok(midi) => {
                        *last_pitch = Some(midi);
                        midi
                    }
                    Err(err) => {
                        warn!("{err}, reusing previous pitch");
                        (*last_pitch)?
                    }
                };
                env.tuning.midi_to_freq(midi)
            };
            fields.insert("freq".to_string(), freq);
            fields.insert("midinote".to_string(), 69.0 + 12.0 * (freq / 440.0).log2());
        }
        SynthKind::Sample => {
            let buf = match degree {
                Value::Char(c) if !is_rest_selector(c) => {
                    let index = event.layer(Attr::Sample, i).as_f64().unwrap_or(0.0) as i64;
                    env.bank.bufnum(c, index)
                }
                _ => 0,
            };
            fields.insert("buf".to_string(), buf as f64);
        }
        SynthKind::Loop => {
            let buf = event.layer(Attr::Buf, i).as_f64().unwrap_or(0.0);
            let pos = degree.as_f64().unwrap_or(0.0) * env.clock.beat_dur(1.0);
            fields.insert("buf".to_string(), buf);
            fields.insert("pos".to_string(), pos);
        }
    }

    Some(fields)
}

fn effect_groups(event: &Event, i: usize, fields: &BTreeMap<String, f64>) -> Vec<EffectGroup> {
    let mut groups = Vec::new();
    'fx: for fx in EFFECTS {
        let title = event.layer(fx.title, i).as_f64().unwrap_or(0.0);
        if title == 0.0 {
            continue;
        }
        let mut params = vec![(fx.title.name().to_string(), title)];
        for arg in fx.args {
            let value = fields
                .get(arg.name())
                .copied()
                .or_else(|| event.layer(*arg, i).as_f64());
            match value {
                Some(v) => params.push((arg.name().to_string(), v)),
                None => {
                    let err = OstinatoError::MissingEffectArg {
                        effect: fx.name,
                        arg: arg.name(),
                    };
                    warn!("{err}, effect dropped");
                    continue 'fx;
                }
            }
        }
        groups.push(EffectGroup {
            name: fx.name.to_string(),
            params,
        });
    }
    groups
}
