#[cfg(test)]
mod test {
    use crate::{
        dm::{measure_dm, DmMeasurement, DmPaths},
        errors::Error,
        fitter::{FitMode, FitRequest},
        tests::toolkit::{random_name, write_file, ScriptedFitter},
    };

    const PAR: &str = "PSRJ J1939+2134\nF0 641.9282626\nPEPOCH 55000\nDMEPOCH 56000\nDM 71.0 1\n";

    fn summary(uncertainty: &str) -> String {
        format!(
            "RMS pre-fit residual = 1.204 (us), RMS post-fit residual = 0.981 (us)
Fit Chisq = 210.4\tChisqr/nfree = 210.4/200 = 1.052\tpre/post = 1.22
PARAMETER       Pre-fit                   Post-fit                  Uncertainty   Difference   Fit
DM (cm^-3 pc)   71.0                      71.0123                   {}       0.0123       Y
",
            uncertainty
        )
    }

    #[test]
    fn valid_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let name = random_name(8);
        let par = write_file(dir.path(), &format!("{}.par", name), PAR);
        let tim = write_file(dir.path(), &format!("{}.tim", name), "FORMAT 1\n");
        let request = FitRequest::new(&par, &tim, FitMode::Residuals);

        let fitter = ScriptedFitter(summary("0.0004"));
        let dm = measure_dm(&fitter, &request, dir.path()).unwrap().unwrap();

        assert_eq!(dm.dm, 71.0123);
        assert_eq!(dm.error, 0.0004);
        assert_eq!(dm.epoch, 56000.0);
        assert_eq!(dm.reduced_chi2, 1.052);
        assert_eq!(dm.residual_rms_us, 0.981);

        let paths = DmPaths::for_toa_list(&tim, dir.path());
        let text = std::fs::read_to_string(&paths.text).unwrap();
        assert_eq!(
            text,
            "DM 71.0123\nERR 0.0004\nEPOCH 56000\nCHI2R 1.052\nTRES 0.981\n"
        );

        let json = std::fs::read_to_string(&paths.json).unwrap();
        let parsed: DmMeasurement = serde_json::from_str(&json).unwrap();
        assert!((parsed.dm - dm.dm).abs() < 1.0E-12);
        assert!((parsed.error - dm.error).abs() < 1.0E-15);
        assert_eq!(parsed.epoch, 56000.0);
    }

    #[test]
    fn invalid_measurement_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let name = random_name(8);
        let par = write_file(dir.path(), &format!("{}.par", name), PAR);
        let tim = write_file(dir.path(), &format!("{}.tim", name), "FORMAT 1\n");
        let request = FitRequest::new(&par, &tim, FitMode::DispersionMeasure);
        let paths = DmPaths::for_toa_list(&tim, dir.path());

        // previous valid run
        let fitter = ScriptedFitter(summary("0.0004"));
        assert!(measure_dm(&fitter, &request, dir.path()).unwrap().is_some());
        assert!(paths.text.exists());
        assert!(paths.json.exists());

        for uncertainty in ["inf", "nan", "-"] {
            let fitter = ScriptedFitter(summary(uncertainty));
            assert!(measure_dm(&fitter, &request, dir.path()).unwrap().is_none());
            assert!(!paths.text.exists());
            assert!(!paths.json.exists());
        }

        let fitter = ScriptedFitter(String::new());
        assert!(measure_dm(&fitter, &request, dir.path()).unwrap().is_none());
    }

    #[test]
    fn unreadable_timing_model() {
        let dir = tempfile::tempdir().unwrap();
        let tim = write_file(dir.path(), "J1939+2134.tim", "FORMAT 1\n");
        let request = FitRequest::new(dir.path().join("missing.par"), &tim, FitMode::DispersionMeasure);

        let fitter = ScriptedFitter(summary("0.0004"));
        let dm = measure_dm(&fitter, &request, dir.path()).unwrap().unwrap();
        assert!(dm.epoch.is_nan());

        // NaN epoch is serialized as null
        let paths = DmPaths::for_toa_list(&tim, dir.path());
        let json = std::fs::read_to_string(&paths.json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["EPOCH"].is_null());
    }

    #[test]
    fn failed_write_leaves_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let name = random_name(8);
        let par = write_file(dir.path(), &format!("{}.par", name), PAR);
        let tim = write_file(dir.path(), &format!("{}.tim", name), "FORMAT 1\n");
        let request = FitRequest::new(&par, &tim, FitMode::DispersionMeasure);
        let paths = DmPaths::for_toa_list(&tim, dir.path());

        // json output cannot be created
        std::fs::create_dir(&paths.json).unwrap();

        let fitter = ScriptedFitter(summary("0.0004"));
        let result = measure_dm(&fitter, &request, dir.path());
        assert!(matches!(result, Err(Error::Formatting(_))));
        assert!(!paths.text.exists());
    }
}
