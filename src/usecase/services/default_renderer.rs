use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::resource::ColumnSpec;
use crate::domain::schema::formatters::display_value;
use crate::usecase::ports::hooks::ItemRenderer;
use crate::usecase::ports::view::CardView;

/// Minimal card built from a resource's columns: first column as title, the rest as fields.
#[derive(Debug, Clone, Default)]
pub struct ColumnCardRenderer {
    columns: Vec<ColumnSpec>,
}

impl ColumnCardRenderer {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    fn format(column: &ColumnSpec, value: &Value) -> String {
        match column.formatter {
            Some(formatter) => formatter.apply(value),
            None => display_value(value),
        }
    }
}

impl<T: Serialize> ItemRenderer<T> for ColumnCardRenderer {
    fn render_item(&self, record: &T) -> CardView {
        let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
            return CardView::titled("-");
        };

        let Some((first, rest)) = self.columns.split_first() else {
            return fields
                .iter()
                .fold(CardView::titled("-"), |card, (key, value)| {
                    card.field(key.as_str(), display_value(value))
                });
        };

        let null = Value::Null;
        let mut card =
            CardView::titled(Self::format(first, fields.get(&first.key).unwrap_or(&null)));
        if let Some(id) = fields.get("id").or_else(|| fields.get("person_id")) {
            card = card.with_key(display_value(id));
        }
        rest.iter().fold(card, |card, column| {
            let value = fields.get(&column.key).unwrap_or(&null);
            card.field(column.title.as_str(), Self::format(column, value))
        })
    }
}
