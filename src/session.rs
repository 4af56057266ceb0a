use crate::review::ReviewFilter;

/// Everything the reviewer has selected so far.
///
/// `cursor` is a position in the filtered view, not a record id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSession {
    pub file_name: Option<String>,
    pub filter: ReviewFilter,
    pub cursor: Option<usize>,
    pub reference: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    SelectFile(String),
    SetFilter(ReviewFilter),
    SelectReference(Option<usize>),
    Select(usize),
    Next,
    Prev,
    Deselect,
    /// The current row's scores were written.
    Saved,
}

impl ReviewSession {
    /// Applies one interaction. `view_len` is the length of the filtered view
    /// the action is taken against.
    pub fn apply(self, action: SessionAction, view_len: usize) -> Self {
        let mut next = self;
        match action {
            SessionAction::SelectFile(file_name) => {
                if next.file_name.as_deref() != Some(file_name.as_str()) {
                    next.filter = ReviewFilter::default();
                    next.cursor = None;
                }
                next.file_name = Some(file_name);
                return next;
            }
            SessionAction::SetFilter(filter) => {
                next.filter = filter;
                next.cursor = None;
                return next;
            }
            SessionAction::SelectReference(reference) => next.reference = reference,
            SessionAction::Select(position) => {
                if position < view_len {
                    next.cursor = Some(position);
                }
            }
            SessionAction::Next => {
                next.cursor = match next.cursor {
                    Some(position) => Some((position + 1).min(view_len.saturating_sub(1))),
                    None => (view_len > 0).then_some(0),
                };
            }
            SessionAction::Prev => {
                next.cursor = next.cursor.map(|position| position.saturating_sub(1));
            }
            SessionAction::Deselect => next.cursor = None,
            SessionAction::Saved => {
                if let Some(position) = next.cursor
                    && position + 1 < view_len
                {
                    next.cursor = Some(position + 1);
                }
            }
        }

        if next.cursor.is_some_and(|position| position >= view_len) {
            next.cursor = view_len.checked_sub(1);
        }
        next
    }
}
