use std::collections::HashMap;

/// Track colors handed out in order, then reused from the start.
/// `#009bf` is short one digit; consumers have always received it as-is.
pub const PALETTE: [&str; 107] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#e6beff", "#9a6324", "#fffac8", "#800000", "#aaffc3",
    "#808000", "#ffd8b1", "#000075", "#808080", "#000000", "#ff9180", "#a65b29", "#665a4d",
    "#998226", "#143300", "#7fff80", "#6cd9d2", "#0077b3", "#265499", "#1f00e6", "#6c468c",
    "#d9a3d5", "#a6296c", "#d96c7b", "#4c0000", "#8c5946", "#664733", "#bf8000", "#736739",
    "#74a653", "#004d1f", "#00474d", "#99bbcc", "#80b3ff", "#0a004d", "#b63df2", "#f200c2",
    "#997387", "#66333a", "#330d0d", "#ffd0bf", "#ff8800", "#332b1a", "#d9d26c", "#299900",
    "#008044", "#46888c", "#102940", "#293aa6", "#290099", "#2b1a33", "#e673cf", "#660029",
    "#d9a3aa", "#806060", "#332a26", "#331b00", "#f2deb6", "#add900", "#d0ffbf", "#73e6b0",
    "#bffbff", "#406280", "#7382e6", "#2e1966", "#8f0099", "#594355", "#ff80b3", "#e55039",
    "#ff6600", "#ffc480", "#f2c200", "#475900", "#53664d", "#0d3326", "#009bf", "#0061f2",
    "#7c82a6", "#c6b6f2", "#300033", "#f20081", "#f20041", "#66241a", "#592400", "#a67f53",
    "#4c3d00", "#aab386", "#20f200", "#468c75", "#39494d", "#001f4d", "#4d5066", "#a173e6",
    "#591655", "#400022", "#990014",
];

/// Binds each distinct key to the next palette entry. One per search.
#[derive(Debug, Default)]
pub struct ColorAssigner {
    assigned: HashMap<String, &'static str>,
    next: usize,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, key: &str) -> &'static str {
        if let Some(color) = self.assigned.get(key) {
            return *color;
        }
        let color = PALETTE[self.next % PALETTE.len()];
        self.next += 1;
        self.assigned.insert(key.to_string(), color);
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
