//! A volatile database driver.
//!
//! Nothing survives the supervisor process. It is meant for tests and for
//! hosts where the services are fully described by the configuration file.
use std::panic::Location;

use dashmap::DashMap;
use hxe_configuration::Driver;
use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec};

use super::{Database, Error, StoredService};

const DRIVER: Driver = Driver::Memory;

#[derive(Debug, Default)]
pub struct Memory {
    specs: DashMap<ServiceId, ServiceSpec>,
    records: DashMap<ServiceId, ServiceRecord>,
}

impl Database for Memory {
    fn create_database_tables(&self) -> Result<(), Error> {
        Ok(())
    }

    fn drop_database_tables(&self) -> Result<(), Error> {
        self.records.clear();
        self.specs.clear();

        Ok(())
    }

    fn load_services(&self) -> Result<Vec<StoredService>, Error> {
        let mut services: Vec<StoredService> = self
            .specs
            .iter()
            .map(|spec| (spec.value().clone(), self.records.get(spec.key()).map(|record| record.clone())))
            .collect();

        services.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));

        Ok(services)
    }

    fn load_spec(&self, id: &ServiceId) -> Result<Option<ServiceSpec>, Error> {
        Ok(self.specs.get(id).map(|spec| spec.clone()))
    }

    fn save_spec(&self, spec: &ServiceSpec) -> Result<(), Error> {
        self.specs.insert(spec.id.clone(), spec.clone());

        Ok(())
    }

    fn save_record(&self, record: &ServiceRecord) -> Result<(), Error> {
        if !self.specs.contains_key(&record.id) {
            return Err(Error::InsertFailed {
                location: Location::caller(),
                driver: DRIVER,
            });
        }

        self.records.insert(record.id.clone(), record.clone());

        Ok(())
    }

    fn remove_service(&self, id: &ServiceId) -> Result<(), Error> {
        self.records.remove(id);

        match self.specs.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::DeleteFailed {
                location: Location::caller(),
                error_code: 0,
                driver: DRIVER,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use hxe_primitives::{ServiceId, ServiceRecord};
    use hxe_test_helpers::fixtures;

    use super::Memory;
    use crate::core::databases::{Database, Error};

    #[test]
    fn it_should_list_the_services_ordered_by_id() {
        let database = Memory::default();

        for id in ["zeta", "alpha", "mid"] {
            let spec = fixtures::sleeper(ServiceId::new(id).unwrap());
            database.save_spec(&spec).unwrap();
        }

        let ids: Vec<String> = database
            .load_services()
            .unwrap()
            .into_iter()
            .map(|(spec, _)| spec.id.to_string())
            .collect();

        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn it_should_forget_everything_when_the_tables_are_dropped() {
        let database = Memory::default();
        let spec = fixtures::sleeper(ServiceId::new("web").unwrap());

        database.save_spec(&spec).unwrap();
        database.save_record(&ServiceRecord::ready(spec.id.clone())).unwrap();

        database.drop_database_tables().unwrap();

        assert_eq!(database.load_services().unwrap(), vec![]);
        assert_eq!(database.load_spec(&spec.id).unwrap(), None);
    }

    #[test]
    fn it_should_refuse_a_record_without_a_spec() {
        let database = Memory::default();

        let record = ServiceRecord::ready(ServiceId::new("orphan").unwrap());

        assert!(matches!(database.save_record(&record), Err(Error::InsertFailed { .. })));
    }

    #[test]
    fn it_should_remove_the_record_with_its_spec() {
        let database = Memory::default();
        let spec = fixtures::sleeper(ServiceId::new("web").unwrap());

        database.save_spec(&spec).unwrap();
        database.save_record(&ServiceRecord::ready(spec.id.clone())).unwrap();
        database.remove_service(&spec.id).unwrap();

        assert!(database.load_services().unwrap().is_empty());
        assert!(database.remove_service(&spec.id).is_err());
    }
}
