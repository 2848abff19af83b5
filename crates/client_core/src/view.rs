use shared::domain::SessionView;

/// Active view. Pure routing state for the presentation layer.
#[derive(Debug, Default)]
pub struct ViewState {
    active: SessionView,
}

impl ViewState {
    pub fn active(&self) -> SessionView {
        self.active
    }

    /// Returns whether the active view changed.
    pub fn show(&mut self, view: SessionView) -> bool {
        let changed = self.active != view;
        self.active = view;
        changed
    }
}
