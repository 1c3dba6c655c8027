use serde::Deserialize;

use crate::dispatch::LinkContext;
use crate::extension::{ExtensionBag, Extras};
use crate::property::{dispatch_extensions, impl_property, HookResult, NodeRef, Property};

#[derive(Clone, Debug, Deserialize)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<Channel>,
    pub samplers: Vec<AnimationSampler>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

/// Binds an animation sampler to a node property.
#[derive(Clone, Debug, Deserialize)]
pub struct Channel {
    pub sampler: usize,
    pub target: ChannelTarget,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl Property for Channel {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        dispatch_extensions(self.extensions(), target, ctx);
        dispatch_extensions(self.target.extensions.as_ref(), target, ctx);
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChannelTarget {
    /// Absent when an extension supplies the target
    pub node: Option<usize>,
    pub path: String,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnimationSampler {
    /// Keyframe times accessor
    pub input: usize,
    /// Keyframe values accessor
    pub output: usize,
    #[serde(default = "default_interpolation")]
    pub interpolation: String,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_interpolation() -> String {
    "LINEAR".to_string()
}

impl_property!(Animation, ChannelTarget, AnimationSampler);
