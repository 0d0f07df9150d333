//! Headless editable grid: columns, cell editing, create form, client-local
//! pagination and filtering, and a plain-text renderer.

use roster_core::{FieldPatch, Person, PersonDraft, PersonField, PersonId};

use crate::error::{ClientError, Result};
use crate::pending::MutationState;
use crate::reconciler::{Notice, Reconciler};
use crate::session::{MutationHandle, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    LastName,
    Age,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Name, Column::LastName, Column::Age];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Name => "Name",
            Column::LastName => "Last Name",
            Column::Age => "Age",
        }
    }

    pub fn field(&self) -> PersonField {
        match self {
            Column::Name => PersonField::FirstName,
            Column::LastName => PersonField::LastName,
            Column::Age => PersonField::Age,
        }
    }

    fn cell(&self, person: &Person) -> String {
        person.value(self.field()).to_string()
    }
}

/// Transient edit state of one cell. Keystrokes stay here until blur.
#[derive(Debug, Clone)]
pub struct CellEditor {
    id: PersonId,
    field: PersonField,
    original: String,
    text: String,
}

impl CellEditor {
    pub fn open(person: &Person, field: PersonField) -> Self {
        let original = person.value(field).to_string();
        Self {
            id: person.id.clone(),
            field,
            text: original.clone(),
            original,
        }
    }

    pub fn id(&self) -> &PersonId {
        &self.id
    }

    pub fn field(&self) -> PersonField {
        self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_dirty(&self) -> bool {
        self.text != self.original
    }

    /// Takes the record's current value when it differs from the one the
    /// editor was opened with. Local text is replaced, as the cell shows
    /// whatever the snapshot holds.
    ///
    /// Returns whether the editor changed. Other records are ignored.
    pub fn sync(&mut self, person: &Person) -> bool {
        if person.id != self.id {
            return false;
        }
        let current = person.value(self.field).to_string();
        if current == self.original {
            return false;
        }
        tracing::debug!("Cell {}.{} resynced to {}", self.id, self.field, current);
        self.text = current.clone();
        self.original = current;
        true
    }

    /// Parses the edited text for the cell's field. `None` when unchanged.
    pub fn commit(&self) -> Result<Option<FieldPatch>> {
        if !self.is_dirty() {
            return Ok(None);
        }
        Ok(Some(FieldPatch::parse_input(self.field, &self.text)?))
    }

    /// Focus left the cell: dispatch the edit if there is one.
    pub fn blur(self, session: &Session) -> Result<Option<MutationHandle>> {
        match self.commit()? {
            Some(patch) => session.submit_patch(&self.id, patch).map(Some),
            None => Ok(None),
        }
    }
}

/// Text inputs of the "add person" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateForm {
    pub first_name: String,
    pub last_name: String,
    pub age: String,
}

impl CreateForm {
    pub fn to_draft(&self) -> Result<PersonDraft> {
        let age = self.age.trim().parse::<i32>().map_err(|_| {
            ClientError::Validation(format!("age must be an integer, got '{}'", self.age))
        })?;
        Ok(PersonDraft::new(
            self.first_name.clone(),
            self.last_name.clone(),
            age,
        ))
    }

    /// Submit is disabled while a create is in flight.
    pub fn can_submit(&self, state: MutationState) -> bool {
        state != MutationState::Pending
    }

    pub fn submit(&self, session: &Session) -> Result<MutationHandle> {
        if !self.can_submit(session.create_state()) {
            return Err(ClientError::Validation(
                "a create is already in flight".to_string(),
            ));
        }
        let draft = self.to_draft()?;
        Ok(session.submit_create(draft))
    }

    /// Clears the inputs on success; keeps them on failure.
    pub fn on_settled(&mut self, outcome: &Result<Person>) {
        if outcome.is_ok() {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridView {
    pub rows: Vec<Person>,
    pub page_index: usize,
    pub page_count: usize,
    /// Rows passing the filter
    pub matching_rows: usize,
    pub total_rows: usize,
    pub filter: String,
}

/// Pagination and filter state of the grid.
#[derive(Debug, Clone)]
pub struct EditableGrid {
    page_index: usize,
    page_size: usize,
    filter: String,
    seen_revision: Option<u64>,
}

impl EditableGrid {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            filter: String::new(),
            seen_revision: None,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Case-insensitive match against every column.
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.page_index = 0;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page_index = 0;
    }

    pub fn set_page(&mut self, page_index: usize) {
        self.page_index = page_index;
    }

    pub fn next_page(&mut self) {
        self.page_index += 1;
    }

    pub fn prev_page(&mut self) {
        self.page_index = self.page_index.saturating_sub(1);
    }

    /// Renders the session's current snapshot.
    pub fn view(&mut self, session: &Session) -> GridView {
        session.with_core(|core| self.render_cycle(core))
    }

    /// One render cycle: reset the page on data changes unless the reset
    /// guard says otherwise, then filter, clamp and slice.
    pub fn render_cycle(&mut self, core: &mut Reconciler) -> GridView {
        let revision = core.revision();
        let data_changed = self.seen_revision.is_some_and(|seen| seen != revision);
        self.seen_revision = Some(revision);

        if core.reset_guard_mut().begin_cycle(data_changed) {
            self.page_index = 0;
        }

        let records = core.snapshot().records();
        let needle = self.filter.trim().to_lowercase();
        let matching: Vec<&Person> = records
            .iter()
            .filter(|p| matches_filter(p, &needle))
            .collect();

        let page_count = matching.len().div_ceil(self.page_size).max(1);
        if self.page_index >= page_count {
            self.page_index = page_count - 1;
        }
        let rows = matching
            .iter()
            .skip(self.page_index * self.page_size)
            .take(self.page_size)
            .map(|p| (*p).clone())
            .collect();

        let view = GridView {
            rows,
            page_index: self.page_index,
            page_count,
            matching_rows: matching.len(),
            total_rows: records.len(),
            filter: self.filter.clone(),
        };
        core.reset_guard_mut().end_cycle();
        view
    }
}

fn matches_filter(person: &Person, needle: &str) -> bool {
    needle.is_empty()
        || Column::ALL
            .iter()
            .any(|c| c.cell(person).to_lowercase().contains(needle))
}

/// Plain-text table. Unsaved rows are marked with `*`.
pub fn render(view: &GridView, notices: &[Notice]) -> String {
    let mut widths: Vec<usize> = Column::ALL.iter().map(|c| c.header().len()).collect();
    let cells: Vec<Vec<String>> = view
        .rows
        .iter()
        .map(|p| Column::ALL.iter().map(|c| c.cell(p)).collect())
        .collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |marker: &str, row: &[String], out: &mut String| {
        out.push_str(marker);
        let padded: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        out.push_str(padded.join(" | ").trim_end());
        out.push('\n');
    };

    let headers: Vec<String> = Column::ALL.iter().map(|c| c.header().to_string()).collect();
    line("  ", &headers, &mut out);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str("  ");
    out.push_str(&rule.join("-+-"));
    out.push('\n');

    if cells.is_empty() {
        out.push_str("  (no rows)\n");
    }
    for (person, row) in view.rows.iter().zip(&cells) {
        let marker = if person.id.is_placeholder() { "* " } else { "  " };
        line(marker, row, &mut out);
    }

    out.push_str(&format!(
        "Page {} of {} ({} of {} rows",
        view.page_index + 1,
        view.page_count,
        view.matching_rows,
        view.total_rows
    ));
    if !view.filter.is_empty() {
        out.push_str(&format!(", filter \"{}\"", view.filter));
    }
    out.push_str(")\n");
    if view.rows.iter().any(|p| p.id.is_placeholder()) {
        out.push_str("* not yet saved\n");
    }
    for notice in notices {
        out.push_str(&format!("! {}\n", notice.message));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::FieldValue;

    fn people(n: usize) -> Vec<Person> {
        (0..n)
            .map(|i| {
                PersonDraft::new(format!("First{i}"), format!("Last{i}"), 20 + i as i32)
                    .into_person(PersonId::generate())
            })
            .collect()
    }

    fn loaded(records: Vec<Person>) -> Reconciler {
        let mut core = Reconciler::default();
        let ticket = core.invalidate().unwrap();
        core.complete_fetch(ticket.generation, Ok(records));
        core
    }

    fn refetch(core: &mut Reconciler, records: Vec<Person>) {
        let ticket = core.invalidate().unwrap();
        core.complete_fetch(ticket.generation, Ok(records));
    }

    #[test]
    fn test_pagination_slices_and_clamps() {
        let mut core = loaded(people(25));
        let mut grid = EditableGrid::new(10);

        let view = grid.render_cycle(&mut core);
        assert_eq!(view.page_count, 3);
        assert_eq!(view.rows.len(), 10);

        grid.next_page();
        grid.next_page();
        let view = grid.render_cycle(&mut core);
        assert_eq!(view.page_index, 2);
        assert_eq!(view.rows.len(), 5);
        assert_eq!(view.rows[0].first_name, "First20");

        grid.set_page(9);
        assert_eq!(grid.render_cycle(&mut core).page_index, 2);
        grid.prev_page();
        assert_eq!(grid.render_cycle(&mut core).page_index, 1);
    }

    #[test]
    fn test_filter_is_case_insensitive_across_columns() {
        let mut records = people(3);
        records[1].last_name = "Lovelace".into();
        let mut core = loaded(records);
        let mut grid = EditableGrid::new(10);

        grid.set_filter("LOVE");
        let view = grid.render_cycle(&mut core);
        assert_eq!(view.matching_rows, 1);
        assert_eq!(view.total_rows, 3);
        assert_eq!(view.rows[0].last_name, "Lovelace");

        grid.set_filter("22");
        assert_eq!(grid.render_cycle(&mut core).rows[0].age, 22);

        grid.set_filter("nobody");
        let view = grid.render_cycle(&mut core);
        assert!(view.rows.is_empty());
        assert_eq!(view.page_count, 1);
    }

    #[test]
    fn test_data_change_resets_page() {
        let records = people(25);
        let mut core = loaded(records.clone());
        let mut grid = EditableGrid::new(10);
        grid.render_cycle(&mut core);
        grid.set_page(2);
        assert_eq!(grid.render_cycle(&mut core).page_index, 2);

        let mut changed = records;
        changed[0].age = 99;
        refetch(&mut core, changed);
        assert_eq!(grid.render_cycle(&mut core).page_index, 0);
    }

    #[test]
    fn test_own_edit_keeps_page_for_one_change() {
        let records = people(25);
        let mut core = loaded(records.clone());
        let mut grid = EditableGrid::new(10);
        grid.render_cycle(&mut core);
        grid.set_page(2);
        grid.render_cycle(&mut core);

        let target = records[21].id.clone();
        core.submit_field_update(&target, PersonField::Age, FieldValue::Integer(50))
            .unwrap();
        let view = grid.render_cycle(&mut core);
        assert_eq!(view.page_index, 2);
        assert_eq!(view.rows[1].age, 50);

        // The guard re-armed after that cycle.
        let mut changed = records;
        changed[0].age = 1;
        refetch(&mut core, changed);
        assert_eq!(grid.render_cycle(&mut core).page_index, 0);
    }

    #[test]
    fn test_cell_editor_parses_by_field_type() {
        let ada = PersonDraft::new("Ada", "Lovelace", 36).into_person(PersonId::generate());

        let mut age = CellEditor::open(&ada, PersonField::Age);
        assert_eq!(age.text(), "36");
        assert_eq!(age.commit().unwrap(), None);

        age.set_text("41");
        let patch = age.commit().unwrap().unwrap();
        assert_eq!(patch.value(), &FieldValue::Integer(41));

        age.set_text("forty-one");
        assert!(age.commit().unwrap_err().is_validation());

        let mut name = CellEditor::open(&ada, PersonField::FirstName);
        name.set_text("41");
        assert_eq!(
            name.commit().unwrap().unwrap().value(),
            &FieldValue::Text("41".into())
        );
    }

    #[test]
    fn test_cell_editor_follows_refetched_value() {
        let records = people(2);
        let mut core = loaded(records.clone());
        let target = records[1].clone();
        let mut editor = CellEditor::open(&target, PersonField::Age);
        assert_eq!(editor.text(), "21");

        // Another client sets the age to 30; the refetch brings it in.
        let mut changed = records.clone();
        changed[1].age = 30;
        refetch(&mut core, changed);
        let fresh = core.snapshot().get(&target.id).unwrap().clone();
        assert!(editor.sync(&fresh));
        assert_eq!(editor.text(), "30");
        assert!(!editor.is_dirty());

        // Typing the old value back is now a real edit.
        editor.set_text("21");
        assert_eq!(
            editor.commit().unwrap().unwrap().value(),
            &FieldValue::Integer(21)
        );

        // Unchanged value or another record: nothing happens.
        assert!(!editor.sync(&fresh));
        assert_eq!(editor.text(), "21");
        assert!(!editor.sync(&records[0]));
    }

    #[test]
    fn test_create_form() {
        let mut form = CreateForm {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            age: " 36 ".into(),
        };
        assert_eq!(
            form.to_draft().unwrap(),
            PersonDraft::new("Ada", "Lovelace", 36)
        );
        assert!(!form.can_submit(MutationState::Pending));
        assert!(form.can_submit(MutationState::RolledBack));

        form.on_settled(&Err(ClientError::Transport("down".into())));
        assert_eq!(form.first_name, "Ada");

        let saved = form.to_draft().unwrap().into_person(PersonId::generate());
        form.on_settled(&Ok(saved));
        assert_eq!(form, CreateForm::default());

        form.age = "old".into();
        assert!(form.to_draft().unwrap_err().is_validation());
    }

    #[test]
    fn test_render_marks_unsaved_rows_and_notices() {
        let mut core = loaded(people(1));
        core.begin_create(PersonDraft::new("Grace", "Hopper", 85));
        let mut grid = EditableGrid::new(10);
        let view = grid.render_cycle(&mut core);
        let notices = vec![Notice {
            kind: crate::reconciler::NoticeKind::UpdateFailed,
            message: "Failed to update age".into(),
        }];

        let text = render(&view, &notices);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("  Name"));
        assert!(lines[0].contains("Last Name"));
        assert!(lines[2].starts_with("  First0"));
        assert!(lines[3].starts_with("* Grace"));
        assert!(text.contains("Page 1 of 1 (2 of 2 rows)"));
        assert!(text.contains("* not yet saved"));
        assert!(text.ends_with("! Failed to update age\n"));
    }
}
