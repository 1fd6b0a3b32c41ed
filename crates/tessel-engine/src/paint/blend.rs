use crate::device::BlendFactor;

/// Skeleton slot blend mode.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

/// Separate color/alpha blend factors handed to a batcher.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendFactors {
    pub src_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendFactors {
    /// Straight-alpha "over": `(SRC_ALPHA, ONE, ONE_MINUS_SRC_ALPHA)`.
    pub const ALPHA: BlendFactors = BlendFactors {
        src_color: BlendFactor::SrcAlpha,
        src_alpha: BlendFactor::One,
        dst: BlendFactor::OneMinusSrcAlpha,
    };

    /// Premultiplied "over": `(ONE, ONE, ONE_MINUS_SRC_ALPHA)`.
    pub const PREMULTIPLIED: BlendFactors = BlendFactors {
        src_color: BlendFactor::One,
        src_alpha: BlendFactor::One,
        dst: BlendFactor::OneMinusSrcAlpha,
    };

    #[inline]
    pub const fn new(src_color: BlendFactor, src_alpha: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_color,
            src_alpha,
            dst,
        }
    }

    /// Plain "over" for straight or premultiplied input.
    #[inline]
    pub const fn over(premultiplied_alpha: bool) -> Self {
        if premultiplied_alpha {
            Self::PREMULTIPLIED
        } else {
            Self::ALPHA
        }
    }
}

impl BlendMode {
    /// Source color factor. Only `Normal` and `Additive` depend on premultiplication.
    pub fn source_color(self, premultiplied_alpha: bool) -> BlendFactor {
        match self {
            BlendMode::Normal | BlendMode::Additive if premultiplied_alpha => BlendFactor::One,
            BlendMode::Normal | BlendMode::Additive => BlendFactor::SrcAlpha,
            BlendMode::Multiply => BlendFactor::DstColor,
            BlendMode::Screen => BlendFactor::One,
        }
    }

    pub fn source_alpha(self) -> BlendFactor {
        match self {
            BlendMode::Normal | BlendMode::Additive => BlendFactor::One,
            BlendMode::Multiply => BlendFactor::OneMinusSrcAlpha,
            BlendMode::Screen => BlendFactor::OneMinusSrcColor,
        }
    }

    pub fn dest(self) -> BlendFactor {
        match self {
            BlendMode::Normal | BlendMode::Multiply | BlendMode::Screen => {
                BlendFactor::OneMinusSrcAlpha
            }
            BlendMode::Additive => BlendFactor::One,
        }
    }

    #[inline]
    pub fn factors(self, premultiplied_alpha: bool) -> BlendFactors {
        BlendFactors::new(
            self.source_color(premultiplied_alpha),
            self.source_alpha(),
            self.dest(),
        )
    }

    /// Parses the lowercase names used in skeleton data (`normal`, `additive`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(BlendMode::Normal),
            "additive" => Some(BlendMode::Additive),
            "multiply" => Some(BlendMode::Multiply),
            "screen" => Some(BlendMode::Screen),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BlendFactor::*;

    #[test]
    fn factor_table() {
        assert_eq!(
            BlendMode::Normal.factors(false),
            BlendFactors::new(SrcAlpha, One, OneMinusSrcAlpha)
        );
        assert_eq!(
            BlendMode::Normal.factors(true),
            BlendFactors::new(One, One, OneMinusSrcAlpha)
        );
        assert_eq!(
            BlendMode::Additive.factors(false),
            BlendFactors::new(SrcAlpha, One, One)
        );
        assert_eq!(BlendMode::Additive.factors(true).src_color, One);
        assert_eq!(
            BlendMode::Multiply.factors(true),
            BlendFactors::new(DstColor, OneMinusSrcAlpha, OneMinusSrcAlpha)
        );
        assert_eq!(
            BlendMode::Screen.factors(false),
            BlendFactors::new(One, OneMinusSrcColor, OneMinusSrcAlpha)
        );
    }

    #[test]
    fn names() {
        assert_eq!(BlendMode::from_name("screen"), Some(BlendMode::Screen));
        assert_eq!(BlendMode::from_name("Screen"), None);
    }
}
