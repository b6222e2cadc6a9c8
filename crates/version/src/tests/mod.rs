mod version_set_tests;
