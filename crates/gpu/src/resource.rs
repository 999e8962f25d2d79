use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " #{}"), self.0)
            }
        }

        impl From<$name> for ResourceId {
            fn from(id: $name) -> Self {
                ResourceId::$name(id)
            }
        }
    };
}

handle!(
    /// Linked shader program.
    ProgramId,
    "program"
);
handle!(
    /// 2D or cube colour texture.
    TextureId,
    "texture"
);
handle!(
    /// Set of vertex streams drawn together.
    VertexArrayId,
    "vertex array"
);
handle!(
    /// Depth-only render buffer.
    DepthBufferId,
    "depth buffer"
);
handle!(
    /// Render-target binding of colour and depth attachments. Lives only in the
    /// context; backends never see framebuffer ids.
    FramebufferId,
    "framebuffer"
);

/// Any object owned by a [`GpuContext`](crate::GpuContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    ProgramId(ProgramId),
    TextureId(TextureId),
    VertexArrayId(VertexArrayId),
    DepthBufferId(DepthBufferId),
    FramebufferId(FramebufferId),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramId(id) => id.fmt(f),
            Self::TextureId(id) => id.fmt(f),
            Self::VertexArrayId(id) => id.fmt(f),
            Self::DepthBufferId(id) => id.fmt(f),
            Self::FramebufferId(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_kind() {
        assert_eq!(TextureId(4).to_string(), "texture #4");
        assert_eq!(ResourceId::from(VertexArrayId(2)).to_string(), "vertex array #2");
    }

    #[test]
    fn ordering_groups_by_kind() {
        let mut ids = vec![
            ResourceId::from(TextureId(1)),
            ResourceId::from(ProgramId(9)),
        ];
        ids.sort();
        assert_eq!(ids[0], ResourceId::ProgramId(ProgramId(9)));
    }
}
