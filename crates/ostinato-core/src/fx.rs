//! Effect stages that can be attached to a message

use crate::attr::Attr;

/// An effect is active when its title attribute is non-zero. Companion
/// attributes are sent alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectDef {
    pub name: &'static str,
    pub title: Attr,
    pub args: &'static [Attr],
}

pub const EFFECTS: &[EffectDef] = &[
    EffectDef { name: "highPassFilter", title: Attr::Hpf, args: &[Attr::Hpr] },
    EffectDef { name: "lowPassFilter", title: Attr::Lpf, args: &[Attr::Lpr] },
    EffectDef { name: "chop", title: Attr::Chop, args: &[Attr::Sus] },
    EffectDef { name: "reverb", title: Attr::Room, args: &[Attr::Mix] },
    EffectDef { name: "echo", title: Attr::Echo, args: &[Attr::Sus, Attr::Decay] },
    EffectDef { name: "slideTo", title: Attr::Slide, args: &[Attr::Slidedelay] },
    EffectDef { name: "distortion", title: Attr::Shape, args: &[] },
    EffectDef { name: "coarse", title: Attr::Coarse, args: &[] },
];
