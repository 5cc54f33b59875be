/// Blend state shared by every tree node.
///
/// `weight` and `fading_speed` are only ever mutated by the fixed-step path;
/// `interpolated_weight` is only ever mutated by the render path.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FadeChannel {
    pub weight: f32,
    pub fading_speed: f32,
    pub interpolated_weight: f32,
}

impl FadeChannel {
    /// Active or currently fading in, ignoring the owner chain.
    pub fn is_active_self(&self) -> bool {
        (self.fading_speed == 0.0 && self.weight > 0.0) || self.fading_speed > 0.0
    }

    /// Contributing anything at all, ignoring the owner chain.
    pub fn is_playing_self(&self) -> bool {
        self.fading_speed > 0.0 || self.weight > 0.0
    }

    pub fn is_fading_in_self(&self) -> bool {
        self.fading_speed > 0.0
    }

    pub fn is_fading_out_self(&self) -> bool {
        self.fading_speed < 0.0
    }

    /// Starts a fade towards weight 1. Returns false when already active or
    /// fading in. A non-positive duration jumps straight to full weight.
    pub fn begin_fade_in(&mut self, duration: f32) -> bool {
        if self.is_active_self() {
            return false;
        }

        if duration <= 0.0 {
            self.weight = 1.0;
            self.fading_speed = 0.0;
        } else {
            self.fading_speed = 1.0 / duration;
        }

        true
    }

    /// Starts a fade towards weight 0. Returns false when already inactive or
    /// fading out. A non-positive duration jumps straight to zero weight.
    pub fn begin_fade_out(&mut self, duration: f32) -> bool {
        if (self.fading_speed == 0.0 && self.weight <= 0.0) || self.fading_speed < 0.0 {
            return false;
        }

        if duration <= 0.0 {
            self.weight = 0.0;
            self.fading_speed = 0.0;
        } else {
            self.fading_speed = 1.0 / -duration;
        }

        true
    }

    /// Advances the fade ramp by one fixed step, settling at either bound.
    pub fn advance(&mut self, dt: f32) {
        if self.fading_speed == 0.0 {
            return;
        }

        self.weight += self.fading_speed * dt;

        if self.weight <= 0.0 {
            self.weight = 0.0;
            self.fading_speed = 0.0;
        } else if self.weight >= 1.0 {
            self.weight = 1.0;
            self.fading_speed = 0.0;
        }
    }

    pub fn reset(&mut self) {
        self.weight = 0.0;
        self.fading_speed = 0.0;
    }
}
