// Portal command endpoints.
//
// Writing a program change takes four calls: one authoritative update,
// then a remote-sync plus two report calls that push the change down to
// the hardware. The portal applies the update even when the sync calls
// fail, so only the first call is fatal here.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::IndygoClient;
use crate::error::Error;
use crate::model::FiltrationMode;

impl IndygoClient {
    /// Change a module's filtration program mode.
    ///
    /// `program` is the module's filtration program as carried in
    /// [`ModuleData::filtration_program`](crate::model::ModuleData);
    /// the mode is patched into `programCharacteristics.mode` and the
    /// whole program sent back.
    ///
    /// `PUT /program/update`, then best-effort
    /// `POST /remote/module/configuration/and/programs`,
    /// `POST /module/reportModuleDataSent`,
    /// `POST /program/reportProgramsDataSent`.
    pub async fn set_filtration_mode(
        &self,
        module_id: &str,
        program: &Value,
        mode: FiltrationMode,
    ) -> Result<(), Error> {
        self.ensure_session().await?;

        let mut patched = program.clone();
        patched["programCharacteristics"]["mode"] = json!(mode.as_int());

        // Authoritative update -- failure here fails the command.
        let url = self.url("/program/update")?;
        debug!(module_id, mode = mode.as_int(), "PUT {}", url);
        let resp = self
            .http()
            .put(url)
            .json(&json!({ "module": module_id, "programs": [patched] }))
            .send()
            .await
            .map_err(Error::Network)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            self.invalidate_session();
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            return Err(Error::UpstreamFormat {
                status: status.as_u16(),
                context: "program update failed".into(),
            });
        }

        // Remote sync and reports push the change to the hardware. The
        // update above is already accepted, so failures only get logged.
        if let Some(relay_id) = self.relay_id() {
            self.post_best_effort(
                "/remote/module/configuration/and/programs",
                &json!({ "moduleId": module_id, "relayId": relay_id }),
            )
            .await;
        } else {
            warn!(module_id, "no relay id known -- skipping remote sync");
        }

        self.post_best_effort("/module/reportModuleDataSent", &json!({ "module": module_id }))
            .await;

        self.post_best_effort(
            "/program/reportProgramsDataSent",
            &json!({ "module": module_id, "programs": [patched] }),
        )
        .await;

        Ok(())
    }

    /// POST a JSON body, logging instead of failing on any error.
    async fn post_best_effort(&self, path: &str, body: &Value) {
        let url = match self.url(path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path, error = %e, "skipping sync call");
                return;
            }
        };

        debug!("POST {}", url);
        match self.http().post(url).json(body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!(path, status = %resp.status(), "sync call rejected (non-fatal)");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path, error = %e, "sync call failed (non-fatal)");
            }
        }
    }
}
