#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BrushColor {
    Red,
    Yellow,
    #[default]
    Green,
    Blue,
    Purple,
}

pub const PALETTE: [BrushColor; 5] = [
    BrushColor::Red,
    BrushColor::Yellow,
    BrushColor::Green,
    BrushColor::Blue,
    BrushColor::Purple,
];

impl BrushColor {
    pub fn from_name(name: &str) -> Option<Self> {
        PALETTE
            .iter()
            .copied()
            .find(|color| color.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(self) -> &'static str {
        match self {
            BrushColor::Red => "red",
            BrushColor::Yellow => "yellow",
            BrushColor::Green => "green",
            BrushColor::Blue => "blue",
            BrushColor::Purple => "purple",
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            BrushColor::Red => "#EA5D56",
            BrushColor::Yellow => "#F3D135",
            BrushColor::Green => "#6CBE47",
            BrushColor::Blue => "#53A7F5",
            BrushColor::Purple => "#B36ADE",
        }
    }
}
