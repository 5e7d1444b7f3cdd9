use invoicedb_core::{clock, DocumentKind, SequenceState};

use super::Service;
use crate::{error::ServiceError, settings::AppSettings};

impl Service {
    /// Consumes the next number of `kind`. The counter update is a single
    /// atomic step on the backend.
    pub(super) fn next_number(&self, kind: DocumentKind, settings: &AppSettings) -> Result<String, ServiceError> {
        let scheme = settings.numbering_scheme(kind);
        let year = clock::year_of(self.now());
        let state = self
            .storage
            .update_sequence(kind.as_str(), &mut |s: SequenceState| scheme.advance(s, year))?;
        let number = scheme.format(state);
        tracing::debug!(kind = %kind, %number, "Issued document number");
        Ok(number)
    }

    /// The number the next document of `kind` would get, without consuming it.
    pub fn preview_number(&self, kind: DocumentKind) -> Result<String, ServiceError> {
        let scheme = self.settings()?.numbering_scheme(kind);
        let state = self.storage.get_sequence(kind.as_str())?;
        Ok(scheme.format(scheme.advance(state, clock::year_of(self.now()))))
    }
}
