use serde::{Deserialize, Serialize};

/// Draw/update category. Declaration order is the per-frame dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    PointClouds,
    Covariance,
    Objects,
    Skybox,
    Ground,
    Streets,
    Models,
    Trajectories,
    Text,
    CameraWidget,
    Gui,
}

impl Category {
    pub const COUNT: usize = 11;

    /// Every category, in dispatch order.
    pub const ALL: [Category; Self::COUNT] = [
        Self::PointClouds,
        Self::Covariance,
        Self::Objects,
        Self::Skybox,
        Self::Ground,
        Self::Streets,
        Self::Models,
        Self::Trajectories,
        Self::Text,
        Self::CameraWidget,
        Self::Gui,
    ];

    /// Position in dispatch order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointClouds => "point-clouds",
            Self::Covariance => "covariance",
            Self::Objects => "objects",
            Self::Skybox => "skybox",
            Self::Ground => "ground",
            Self::Streets => "streets",
            Self::Models => "models",
            Self::Trajectories => "trajectories",
            Self::Text => "text",
            Self::CameraWidget => "camera-widget",
            Self::Gui => "gui",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}
