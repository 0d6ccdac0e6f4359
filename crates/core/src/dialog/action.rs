use crate::domain::product::ProductId;

/// Inline button payload. Encoded into the callback data string on the way
/// out and decoded exactly once at the transport boundary on the way back,
/// so the engine only ever sees typed actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    SelectProduct { id: ProductId },
    SelectSize { id: ProductId, size: String },
    Restart,
    AddMore,
    BackToSearch,
    FinishSelection,
    ShowSelected,
    DeleteProduct { id: ProductId },
    ClearAll,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::SelectProduct { id } => format!("product:{id}"),
            Self::SelectSize { id, size } => format!("size:{id}:{size}"),
            Self::Restart => "restart".to_string(),
            Self::AddMore => "add_more".to_string(),
            Self::BackToSearch => "back_to_search".to_string(),
            Self::FinishSelection => "finish".to_string(),
            Self::ShowSelected => "show_selected".to_string(),
            Self::DeleteProduct { id } => format!("delete:{id}"),
            Self::ClearAll => "clear_all".to_string(),
        }
    }

    pub fn decode(data: &str) -> Option<Self> {
        match data {
            "restart" => return Some(Self::Restart),
            "add_more" => return Some(Self::AddMore),
            "back_to_search" => return Some(Self::BackToSearch),
            "finish" => return Some(Self::FinishSelection),
            "show_selected" => return Some(Self::ShowSelected),
            "clear_all" => return Some(Self::ClearAll),
            _ => {}
        }

        // Record ids never contain `:`, but sizes may. Split the size payload
        // into at most three pieces so the size keeps its colons.
        let mut pieces = data.splitn(3, ':');
        let kind = pieces.next()?;
        let id = pieces.next().filter(|id| !id.is_empty())?;

        match kind {
            "product" => {
                pieces.next().is_none().then(|| Self::SelectProduct { id: ProductId(id.to_owned()) })
            }
            "delete" => {
                pieces.next().is_none().then(|| Self::DeleteProduct { id: ProductId(id.to_owned()) })
            }
            "size" => {
                let size = pieces.next().filter(|size| !size.is_empty())?;
                Some(Self::SelectSize { id: ProductId(id.to_owned()), size: size.to_owned() })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CallbackAction;
    use crate::domain::product::ProductId;

    #[test]
    fn every_action_round_trips_through_its_encoding() {
        let actions = [
            CallbackAction::SelectProduct { id: ProductId("rec42".to_owned()) },
            CallbackAction::SelectSize { id: ProductId("rec42".to_owned()), size: "M".to_owned() },
            CallbackAction::Restart,
            CallbackAction::AddMore,
            CallbackAction::BackToSearch,
            CallbackAction::FinishSelection,
            CallbackAction::ShowSelected,
            CallbackAction::DeleteProduct { id: ProductId("rec42".to_owned()) },
            CallbackAction::ClearAll,
        ];

        for action in actions {
            assert_eq!(CallbackAction::decode(&action.encode()), Some(action));
        }
    }

    #[test]
    fn sizes_may_contain_colons() {
        let action = CallbackAction::SelectSize {
            id: ProductId("rec42".to_owned()),
            size: "41:42".to_owned(),
        };
        assert_eq!(CallbackAction::decode(&action.encode()), Some(action));
    }

    #[test]
    fn malformed_data_is_rejected() {
        assert_eq!(CallbackAction::decode("unknown"), None);
        assert_eq!(CallbackAction::decode("product:"), None);
        assert_eq!(CallbackAction::decode("size:rec42"), None);
        assert_eq!(CallbackAction::decode("product:rec42:extra"), None);
    }
}
