use rayon::prelude::*;

use crate::{
    lowering::{self, LoweredMethod},
    metadata::typesystem::{MethodDefId, MethodToCompile, ModuleId},
    session::Session,
    Result,
};

impl Session {
    /// Lower one method body to three-address code.
    ///
    /// # Errors
    /// See [`lowering::lower_method`].
    pub fn lower_method(&self, method: &MethodToCompile) -> Result<LoweredMethod> {
        lowering::lower_method(self, method)
    }

    /// Lower every method of `module` that has a body, in parallel.
    ///
    /// Each method is lowered start to finish on one worker. Results are in method row order;
    /// a method that fails to lower yields its error without affecting the others.
    ///
    /// # Errors
    /// Returns an error if `module` is not loaded or a method's compilation request cannot be
    /// built.
    pub fn lower_all(&self, module: ModuleId) -> Result<Vec<Result<LoweredMethod>>> {
        let requests = self
            .module(module)?
            .methods()
            .iter()
            .filter(|method| method.body.is_some())
            .map(|method| self.method_to_compile(MethodDefId::new(module, method.row)))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("lowering {} methods of {}", requests.len(), module);

        let lowered: Vec<Result<LoweredMethod>> = requests
            .par_iter()
            .map(|method| {
                self.lower_method(method).inspect_err(|error| {
                    log::warn!("cannot lower {}: {}", method.name, error);
                })
            })
            .collect();

        Ok(lowered)
    }
}
